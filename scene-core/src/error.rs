//! Crate-local error type. Mirrors the teacher's one-`thiserror`-enum-per-crate
//! convention (`mvg::MvgError`, `flydra2::Error`): adapter transport failures,
//! cache lookups, and scene-ingest rejections all fold into one type so
//! `scene-controller` has a single `?`-friendly surface.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error, #[cfg(feature = "backtrace")] std::backtrace::Backtrace),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error, #[cfg(feature = "backtrace")] std::backtrace::Backtrace),

    #[error("io: {0}")]
    Io(#[from] std::io::Error, #[cfg(feature = "backtrace")] std::backtrace::Backtrace),

    #[error("geometry: {0}")]
    Geometry(#[from] scene_geometry::GeometryError, #[cfg(feature = "backtrace")] std::backtrace::Backtrace),

    #[error("tracker config: {0}")]
    Config(#[from] scene_config::ConfigError, #[cfg(feature = "backtrace")] std::backtrace::Backtrace),

    #[error("unknown camera {0}")]
    UnknownCamera(String),

    #[error("unknown sensor {0}")]
    UnknownSensor(String),

    #[error("unknown scene {0}")]
    UnknownScene(String),

    #[error("message carries both lat_long_alt and translation")]
    AmbiguousLocation,

    #[error("data source adapter returned no results (statusCode={status_code:?})")]
    NoResults { status_code: Option<u16> },
}

pub type Result<T> = std::result::Result<T, CoreError>;
