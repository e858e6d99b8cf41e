use thiserror::Error;

#[derive(Error, Debug)]
pub enum TypesError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error, #[cfg(feature = "backtrace")] std::backtrace::Backtrace),
}

pub type Result<T> = std::result::Result<T, TypesError>;
