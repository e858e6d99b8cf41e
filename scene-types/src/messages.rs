//! Bus wire message shapes (spec §6). Grounded on the JSON field names used by
//! `examples/original_source/controller/src/controller/scene_controller.py`
//! (`handleMovingObjectMessage`, `handleSensorMessage`, `publishDetections`,
//! `publishEvents`) and expressed the way `flydra-types` expresses its own wire
//! structs: plain `serde`-derived structs, `Option` for fields the source
//! accesses with `.get()`/`hasattr()`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mutually-exclusive location payload carried by a raw detection or an
/// already-tracked object forwarded from a child scene (spec §4.3.4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Location {
    Translation([f64; 3]),
    LatLongAlt([f64; 3]),
}

/// One detected object inside a [`DetectorMessage`] category list.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Detection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box_px: Option<[f64; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<[f64; 4]>,
    #[serde(flatten)]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_detections: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reid: Option<Vec<f64>>,
    /// present on outbound built detections only (spec §4.6)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_data: Option<Value>,
}

/// A camera- or child-scene-origin detector message (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub objects: BTreeMap<String, Vec<Detection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intrinsics: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distortion: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_hmo_start_time: Option<f64>,
}

/// A singleton-sensor reading (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingletonSensorMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub subtype: String,
    pub value: f64,
    pub status: String,
}

/// A single previously-exited object in an [`EventOutput`], carrying its dwell
/// time (spec §4.3.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitedObject {
    pub object: Value,
    pub dwell: f64,
}

/// Region or tripwire event payload (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventOutput {
    pub timestamp: DateTime<Utc>,
    pub scene_id: String,
    pub scene_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tripwire_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tripwire_name: Option<String>,
    pub counts: BTreeMap<String, usize>,
    pub objects: Vec<Value>,
    pub entered: Vec<Value>,
    pub exited: Vec<ExitedObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub metadata: BTreeMap<String, Value>,
}

/// The rate-limited fan-out published on `scenescape/data/regulated/<sceneUid>`
/// (spec §4.5.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulatedOutput {
    pub timestamp: DateTime<Utc>,
    pub objects: BTreeMap<String, Vec<Value>>,
    pub id: String,
    pub name: String,
    pub scene_rate: f64,
    pub rate: BTreeMap<String, f64>,
}
