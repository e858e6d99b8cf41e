//! Crate-local error type for the binary's own plumbing (bus I/O, topic
//! parsing). Handler-level failures against scene state stay inside
//! `scene_core::CoreError` and are logged, not propagated, matching
//! `scene_controller.py`'s "log and invalidate the cache" handler contract
//! (spec §4.5.2 step 8) rather than tearing down the bus loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("mqtt client: {0}")]
    Mqtt(#[from] rumqttc::ClientError, #[cfg(feature = "backtrace")] std::backtrace::Backtrace),

    #[error("mqtt connection: {0}")]
    MqttConnection(#[from] rumqttc::ConnectionError, #[cfg(feature = "backtrace")] std::backtrace::Backtrace),

    #[error("scene-core: {0}")]
    Core(#[from] scene_core::CoreError, #[cfg(feature = "backtrace")] std::backtrace::Backtrace),

    #[error("tracker config: {0}")]
    Config(#[from] scene_config::ConfigError, #[cfg(feature = "backtrace")] std::backtrace::Backtrace),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error, #[cfg(feature = "backtrace")] std::backtrace::Backtrace),
}

pub type Result<T> = std::result::Result<T, ControllerError>;
