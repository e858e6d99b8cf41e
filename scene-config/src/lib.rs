#![deny(rust_2018_idioms)]

//! Tracker configuration file loading and validation (spec §6), grounded on
//! `scene_controller.py`'s `extractTrackerConfigData` / `_extractTimeChunkingEnabled`
//! / `_extractTimeChunkingInterval`, expressed in `braid-config-data`'s style
//! (serde struct + a dedicated validating load function, `thiserror` enum).

use std::path::Path;

use scene_types::TrackerConfig;
use thiserror::Error;

pub const DEFAULT_CHUNKING_INTERVAL_MS: u64 = 50;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading tracker config: {0}")]
    Io(#[from] std::io::Error, #[cfg(feature = "backtrace")] std::backtrace::Backtrace),
    #[error("JSON error in tracker config: {0}")]
    Json(#[from] serde_json::Error, #[cfg(feature = "backtrace")] std::backtrace::Backtrace),
    #[error("invalid value for time_chunking_enabled in tracker config file")]
    InvalidTimeChunkingEnabled,
    #[error("invalid value for time_chunking_interval_milliseconds in tracker config file")]
    InvalidTimeChunkingInterval,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// The durations derived from `tracker_config.json`'s frame counts, computed as
/// `frames / baseline_frame_rate` (spec §6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerTimings {
    pub max_unreliable_time: f64,
    pub non_measurement_time_dynamic: f64,
    pub non_measurement_time_static: f64,
}

impl TrackerTimings {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            max_unreliable_time: config.max_unreliable_frames as f64 / config.baseline_frame_rate,
            non_measurement_time_dynamic: config.non_measurement_frames_dynamic as f64
                / config.baseline_frame_rate,
            non_measurement_time_static: config.non_measurement_frames_static as f64
                / config.baseline_frame_rate,
        }
    }
}

/// Loads and validates a `tracker_config.json` file. Invalid types or an
/// out-of-range `time_chunking_interval_milliseconds` (`<= 0`) are startup
/// errors (spec §6, §7 *Configuration error*); missing optional fields fall
/// back to their documented defaults.
pub fn load_tracker_config<P: AsRef<Path>>(path: P) -> Result<TrackerConfig> {
    let raw = std::fs::read_to_string(path)?;
    parse_tracker_config(&raw)
}

pub fn parse_tracker_config(raw: &str) -> Result<TrackerConfig> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let mut config: TrackerConfig = serde_json::from_value(value.clone())?;

    if let Some(v) = value.get("time_chunking_enabled") {
        if !v.is_boolean() {
            return Err(ConfigError::InvalidTimeChunkingEnabled);
        }
        config.time_chunking_enabled = v.as_bool().ok_or(ConfigError::InvalidTimeChunkingEnabled)?;
    } else {
        config.time_chunking_enabled = false;
    }

    match value.get("time_chunking_interval_milliseconds") {
        None => config.time_chunking_interval_milliseconds = DEFAULT_CHUNKING_INTERVAL_MS,
        Some(v) => {
            let interval = v
                .as_u64()
                .or_else(|| v.as_i64().and_then(|i| u64::try_from(i).ok()))
                .ok_or(ConfigError::InvalidTimeChunkingInterval)?;
            if interval == 0 {
                return Err(ConfigError::InvalidTimeChunkingInterval);
            }
            config.time_chunking_interval_milliseconds = interval;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_json() -> serde_json::Value {
        serde_json::json!({
            "max_unreliable_frames": 10,
            "non_measurement_frames_dynamic": 5,
            "non_measurement_frames_static": 20,
            "baseline_frame_rate": 10.0,
        })
    }

    #[test]
    fn defaults_when_chunking_fields_absent() {
        let config = parse_tracker_config(&base_json().to_string()).unwrap();
        assert!(!config.time_chunking_enabled);
        assert_eq!(config.time_chunking_interval_milliseconds, DEFAULT_CHUNKING_INTERVAL_MS);
    }

    #[test]
    fn rejects_non_positive_interval() {
        let mut json = base_json();
        json["time_chunking_interval_milliseconds"] = serde_json::json!(0);
        let err = parse_tracker_config(&json.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeChunkingInterval));
    }

    #[test]
    fn rejects_non_boolean_enabled_flag() {
        let mut json = base_json();
        json["time_chunking_enabled"] = serde_json::json!("yes");
        let err = parse_tracker_config(&json.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeChunkingEnabled));
    }

    #[test]
    fn derives_timings_from_frame_counts() {
        let config = parse_tracker_config(&base_json().to_string()).unwrap();
        let timings = TrackerTimings::from_config(&config);
        approx::assert_relative_eq!(timings.max_unreliable_time, 1.0);
        approx::assert_relative_eq!(timings.non_measurement_time_static, 2.0);
    }
}
