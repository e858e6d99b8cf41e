//! Scene configuration data model (spec §3), grounded on
//! `examples/original_source/controller/src/controller/scene.py`'s `Scene`/
//! `Region`/`Tripwire`/`Camera` classes. Expressed as plain serde structs in
//! `flydra-types`'s style rather than as Python classes with dynamic attributes
//! (spec §9: "model dynamic attribute presence... as optional fields").

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use scene_geometry::{CameraPose, DistortionCoeffs, Lla};
use serde::{Deserialize, Serialize};

pub type Uid = String;
pub type CameraId = String;
pub type SensorId = String;
pub type Category = String;

/// Wire-level tracker configuration as carried by `updateScene` (spec §6); the
/// derived `time_chunking_interval` etc. live in `scene-config`, which depends
/// on this type rather than redefining it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackerConfig {
    pub max_unreliable_frames: u32,
    pub non_measurement_frames_dynamic: u32,
    pub non_measurement_frames_static: u32,
    pub baseline_frame_rate: f64,
    #[serde(default)]
    pub time_chunking_enabled: bool,
    #[serde(default = "default_chunking_interval_ms")]
    pub time_chunking_interval_milliseconds: u64,
    #[serde(default)]
    pub persist_attributes: BTreeMap<Category, Vec<String>>,
}

fn default_chunking_interval_ms() -> u64 {
    50
}

/// A calibrated (or not-yet-calibrated) camera (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub camera_id: CameraId,
    #[serde(skip)]
    pub pose: Option<std::sync::Arc<CameraPose<f64>>>,
    pub distortion: DistortionCoeffs,
    pub resolution: Option<[f64; 2]>,
}

impl Camera {
    pub fn new(camera_id: CameraId) -> Self {
        Self { camera_id, pose: None, distortion: DistortionCoeffs::zero(), resolution: None }
    }

    pub fn has_pose(&self) -> bool {
        self.pose.is_some()
    }
}

/// A 2D (optionally extruded) occupancy region (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub uid: Uid,
    pub name: String,
    pub polygon: Vec<[f64; 2]>,
    pub height: Option<f64>,
    pub buffer_size: Option<f64>,
    pub volumetric: bool,
    pub compute_intersection: bool,
    /// current occupants per detection category
    #[serde(skip)]
    pub objects: BTreeMap<Category, Vec<Uid>>,
    /// a singleton environmental sensor value, when this region doubles as one
    pub value: Option<f64>,
    #[serde(skip)]
    pub when: Option<f64>,
}

impl Region {
    pub fn new(uid: Uid, name: String, polygon: Vec<[f64; 2]>) -> Self {
        Self {
            uid,
            name,
            polygon,
            height: None,
            buffer_size: None,
            volumetric: false,
            compute_intersection: false,
            objects: BTreeMap::new(),
            value: None,
            when: None,
        }
    }
}

/// A directed polyline evaluated for crossing direction (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tripwire {
    pub uid: Uid,
    pub name: String,
    pub polyline: Vec<[f64; 2]>,
    #[serde(skip)]
    pub objects: BTreeMap<Category, Vec<Uid>>,
    #[serde(skip)]
    pub when: Option<f64>,
}

impl Tripwire {
    pub fn new(uid: Uid, name: String, polyline: Vec<[f64; 2]>) -> Self {
        Self { uid, name, polyline, objects: BTreeMap::new(), when: None }
    }
}

/// A singleton environmental sensor (spec §3, §4.3.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    pub sensor_id: SensorId,
    pub value: Option<f64>,
    pub last_value: Option<f64>,
    #[serde(skip)]
    pub last_when: Option<DateTime<Utc>>,
}

impl Sensor {
    pub fn new(sensor_id: SensorId) -> Self {
        Self { sensor_id, value: None, last_value: None, last_when: None }
    }
}

/// Either a local child scene (same bus) or a remote one (separate broker).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChildLink {
    Local { uid: Uid },
    Remote { uid: Uid, broker_host: String, broker_port: u16 },
}

/// A named world model: cameras, regions, tripwires, sensors, children, and the
/// coordinate-transform metadata described in spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub uid: Uid,
    pub name: String,
    pub map_file: Option<String>,
    pub scale: f64,
    pub cameras: BTreeMap<CameraId, Camera>,
    pub sensors: BTreeMap<SensorId, Sensor>,
    pub regions: BTreeMap<Uid, Region>,
    pub tripwires: BTreeMap<Uid, Tripwire>,
    pub children: BTreeMap<String, ChildLink>,
    /// 16-value row-major affine; meaningful for child scenes.
    pub camera_pose: Option<[f64; 16]>,
    pub parent: Option<Uid>,
    pub use_tracker: bool,
    pub output_lla: bool,
    pub map_corners_lla: Option<[Lla; 4]>,
    #[serde(skip)]
    pub trs_xyz_to_lla: Option<nalgebra::Matrix4<f64>>,
    pub retrack: bool,
    pub regulated_rate: f64,
    pub external_update_rate: f64,
    pub persist_attributes: BTreeMap<Category, Vec<String>>,
    pub tracker_config: Option<TrackerConfig>,

    /// monotonically non-increasing per spec §8 invariant 4; reset on reinit.
    #[serde(skip)]
    pub ref_camera_frame_rate: Option<f64>,
}

impl Scene {
    pub fn new(uid: Uid, name: String) -> Self {
        Self {
            uid,
            name,
            map_file: None,
            scale: 1.0,
            cameras: BTreeMap::new(),
            sensors: BTreeMap::new(),
            regions: BTreeMap::new(),
            tripwires: BTreeMap::new(),
            children: BTreeMap::new(),
            camera_pose: None,
            parent: None,
            use_tracker: true,
            output_lla: false,
            map_corners_lla: None,
            trs_xyz_to_lla: None,
            retrack: true,
            regulated_rate: 1.0,
            external_update_rate: 1.0,
            persist_attributes: BTreeMap::new(),
            tracker_config: None,
            ref_camera_frame_rate: None,
        }
    }

    /// Invariant from spec §8: `trs_xyz_to_lla` is `None` iff `output_lla=false`
    /// or `map_corners_lla` is unset.
    pub fn lla_ready(&self) -> bool {
        self.output_lla && self.map_corners_lla.is_some()
    }

    /// spec §4.3.1: invalidate and eagerly recompute `trs_xyz_to_lla` whenever
    /// both prerequisites are present. The map mesh is always a `scale`-sized
    /// square in local XY (bottom-left, counterclockwise), since `map_file` is
    /// only ever a path to the overlay image and carries no geometry of its own.
    pub fn recompute_trs_xyz_to_lla(&mut self) {
        self.trs_xyz_to_lla = match self.map_corners_lla {
            Some(lla_corners) if self.output_lla => Some(scene_geometry::trs_xyz_to_lla(self.map_mesh_corners(), lla_corners)),
            _ => None,
        };
    }

    fn map_mesh_corners(&self) -> scene_geometry::MapCorners {
        [
            nalgebra::Point3::new(0.0, 0.0, 0.0),
            nalgebra::Point3::new(self.scale, 0.0, 0.0),
            nalgebra::Point3::new(self.scale, self.scale, 0.0),
            nalgebra::Point3::new(0.0, self.scale, 0.0),
        ]
    }

    /// spec §4.3.3 step 3: `ref_camera_frame_rate ← min(prior, frame_rate)`.
    pub fn observe_frame_rate(&mut self, frame_rate: f64) {
        self.ref_camera_frame_rate = Some(match self.ref_camera_frame_rate {
            Some(prior) => prior.min(frame_rate),
            None => frame_rate,
        });
    }

    /// spec §4.3.1 refresh upsert: apply freshly-fetched config fields in
    /// place, preserving every `#[serde(skip)]` live-state field (camera
    /// pose, region/tripwire occupants and debounce timestamps, derived LLA
    /// transform, observed frame rate) for entities that already existed.
    /// Entities absent from `fresh` are dropped; new ones are inserted whole.
    pub fn merge_from(&mut self, fresh: Scene) {
        self.name = fresh.name;
        self.map_file = fresh.map_file;
        self.scale = fresh.scale;
        self.children = fresh.children;
        self.camera_pose = fresh.camera_pose;
        self.parent = fresh.parent;
        self.use_tracker = fresh.use_tracker;
        self.output_lla = fresh.output_lla;
        self.map_corners_lla = fresh.map_corners_lla;
        self.trs_xyz_to_lla = fresh.trs_xyz_to_lla;
        self.retrack = fresh.retrack;
        self.regulated_rate = fresh.regulated_rate;
        self.external_update_rate = fresh.external_update_rate;
        self.persist_attributes = fresh.persist_attributes;
        self.tracker_config = fresh.tracker_config;

        self.cameras.retain(|uid, _| fresh.cameras.contains_key(uid));
        for (uid, camera) in fresh.cameras {
            match self.cameras.get_mut(&uid) {
                Some(existing) => {
                    existing.distortion = camera.distortion;
                    existing.resolution = camera.resolution;
                }
                None => {
                    self.cameras.insert(uid, camera);
                }
            }
        }

        self.sensors.retain(|uid, _| fresh.sensors.contains_key(uid));
        for (uid, sensor) in fresh.sensors {
            match self.sensors.get_mut(&uid) {
                Some(existing) => {
                    existing.value = sensor.value;
                    existing.last_value = sensor.last_value;
                }
                None => {
                    self.sensors.insert(uid, sensor);
                }
            }
        }

        self.regions.retain(|uid, _| fresh.regions.contains_key(uid));
        for (uid, region) in fresh.regions {
            match self.regions.get_mut(&uid) {
                Some(existing) => {
                    existing.name = region.name;
                    existing.polygon = region.polygon;
                    existing.height = region.height;
                    existing.buffer_size = region.buffer_size;
                    existing.volumetric = region.volumetric;
                    existing.compute_intersection = region.compute_intersection;
                    existing.value = region.value;
                }
                None => {
                    self.regions.insert(uid, region);
                }
            }
        }

        self.tripwires.retain(|uid, _| fresh.tripwires.contains_key(uid));
        for (uid, tripwire) in fresh.tripwires {
            match self.tripwires.get_mut(&uid) {
                Some(existing) => {
                    existing.name = tripwire.name;
                    existing.polyline = tripwire.polyline;
                }
                None => {
                    self.tripwires.insert(uid, tripwire);
                }
            }
        }
    }
}

/// Not serialized: a monotonic instant used only for internal TTL bookkeeping
/// (§9 Open Question 1), separate from the serializable `Scene` above.
#[derive(Debug, Clone, Copy)]
pub struct RefreshStamp(pub Instant);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_camera_frame_rate_is_monotonically_non_increasing() {
        let mut scene = Scene::new("s1".into(), "Scene 1".into());
        scene.observe_frame_rate(30.0);
        scene.observe_frame_rate(15.0);
        assert_eq!(scene.ref_camera_frame_rate, Some(15.0));
        scene.observe_frame_rate(30.0);
        assert_eq!(scene.ref_camera_frame_rate, Some(15.0));
    }

    #[test]
    fn lla_ready_requires_both_prerequisites() {
        let mut scene = Scene::new("s1".into(), "Scene 1".into());
        assert!(!scene.lla_ready());
        scene.output_lla = true;
        assert!(!scene.lla_ready());
        scene.map_corners_lla = Some([Lla { lat: 0.0, lon: 0.0, alt: 0.0 }; 4]);
        assert!(scene.lla_ready());
    }

    #[test]
    fn merge_from_preserves_region_and_tripwire_live_state() {
        let mut scene = Scene::new("s1".into(), "Scene 1".into());
        let mut region = Region::new("r1".into(), "Room".into(), vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        region.objects.insert("person".into(), vec!["o1".into()]);
        region.when = Some(42.0);
        scene.regions.insert("r1".into(), region);

        let mut tripwire = Tripwire::new("t1".into(), "Door".into(), vec![[0.0, 0.0], [1.0, 0.0]]);
        tripwire.objects.insert("person".into(), vec!["o1".into()]);
        tripwire.when = Some(7.0);
        scene.tripwires.insert("t1".into(), tripwire);

        let mut fresh = Scene::new("s1".into(), "Scene 1 Renamed".into());
        fresh.regions.insert("r1".into(), Region::new("r1".into(), "Room Renamed".into(), vec![[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]]));
        fresh.tripwires.insert("t1".into(), Tripwire::new("t1".into(), "Door Renamed".into(), vec![[0.0, 0.0], [2.0, 0.0]]));

        scene.merge_from(fresh);

        assert_eq!(scene.name, "Scene 1 Renamed");
        let region = &scene.regions["r1"];
        assert_eq!(region.name, "Room Renamed");
        assert_eq!(region.objects.get("person"), Some(&vec!["o1".to_string()]));
        assert_eq!(region.when, Some(42.0));

        let tripwire = &scene.tripwires["t1"];
        assert_eq!(tripwire.name, "Door Renamed");
        assert_eq!(tripwire.objects.get("person"), Some(&vec!["o1".to_string()]));
        assert_eq!(tripwire.when, Some(7.0));
    }

    #[test]
    fn recompute_trs_xyz_to_lla_requires_both_prerequisites() {
        let mut scene = Scene::new("s1".into(), "Scene 1".into());
        scene.recompute_trs_xyz_to_lla();
        assert!(scene.trs_xyz_to_lla.is_none());

        scene.output_lla = true;
        scene.recompute_trs_xyz_to_lla();
        assert!(scene.trs_xyz_to_lla.is_none());

        scene.map_corners_lla = Some([
            Lla { lat: 1.0, lon: 2.0, alt: 0.0 },
            Lla { lat: 1.0, lon: 2.001, alt: 0.0 },
            Lla { lat: 1.001, lon: 2.001, alt: 0.0 },
            Lla { lat: 1.001, lon: 2.0, alt: 0.0 },
        ]);
        scene.recompute_trs_xyz_to_lla();
        assert!(scene.trs_xyz_to_lla.is_some());

        scene.output_lla = false;
        scene.recompute_trs_xyz_to_lla();
        assert!(scene.trs_xyz_to_lla.is_none());
    }

    #[test]
    fn merge_from_drops_regions_absent_from_the_fresh_fetch() {
        let mut scene = Scene::new("s1".into(), "Scene 1".into());
        scene.regions.insert("r1".into(), Region::new("r1".into(), "Room".into(), vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]));

        let fresh = Scene::new("s1".into(), "Scene 1".into());
        scene.merge_from(fresh);

        assert!(scene.regions.is_empty());
    }
}
