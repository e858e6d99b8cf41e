//! The `Tracker` trait and its bundled constant-velocity implementation.
//!
//! The teacher's `tracking` crate defines Kalman motion/observation models
//! (`ConstantVelocity3DModel`, `ObservationModel2D`) used by `flydra2`'s `adskalman`-based
//! filter in `tracking_core.rs`. That filtering math is explicitly out of scope here
//! (spec §1 Non-goals: "does not own the tracker's filtering math") — we keep the
//! teacher's *constant-velocity* motion assumption (the same `[x y z vx vy vz]`
//! state idea as `motion_model_3d.rs`) but replace the Kalman update with a plain
//! nearest-neighbor association plus a one-step finite-difference velocity estimate,
//! which is sufficient for this crate's testable properties (spec §8 scenario 1) and
//! keeps the dependency on `adskalman` out of this workspace (see DESIGN.md).

use std::collections::BTreeMap;

use nalgebra::Point3;

use crate::object::TrackedObject;

/// One observation submitted to a tracker (spec §4.4 `createObject`).
#[derive(Debug, Clone)]
pub struct TrackerInput {
    pub loc: Point3<f64>,
    pub camera_id: String,
    pub when: f64,
    pub persist_attrs: BTreeMap<String, f64>,
    pub bounding_box: Option<[f64; 4]>,
}

impl TrackerInput {
    pub fn new(loc: Point3<f64>, camera_id: String, when: f64) -> Self {
        Self { loc, camera_id, when, persist_attrs: BTreeMap::new(), bounding_box: None }
    }

    pub fn with_bounding_box(mut self, bounding_box: Option<[f64; 4]>) -> Self {
        self.bounding_box = bounding_box;
        self
    }
}

/// A per-category tracker: the collaborator scoped out of this crate's
/// filtering-math responsibility by spec §1, present here only as a trait
/// object so `scene-core`'s facade has a stable seam and the workspace ships a
/// usable default implementation (spec §4.4).
pub trait Tracker: Send {
    /// Admits a batch of new detections plus any already-tracked (bypassing
    /// re-association, spec §4.3.4) objects for one tick.
    fn track_objects(
        &mut self,
        new: Vec<TrackerInput>,
        already_tracked: Vec<TrackedObject>,
        when: f64,
    );

    /// The tracker's current published track list at the moment of call.
    fn current_objects(&self) -> Vec<TrackedObject>;

    /// Refreshes the class taxonomy used to build a classification vector;
    /// unused by the bundled tracker but part of the stable trait (spec §4.4).
    fn update_object_classes(&mut self, _classes: Vec<String>) {}

    /// Count of distinct track ids ever produced in this category.
    fn unique_id_count(&self) -> usize;
}

struct Track {
    object: TrackedObject,
}

/// Constant-velocity, nearest-neighbor tracker for one detection category.
pub struct ConstantVelocityTracker {
    category: String,
    tracks: BTreeMap<String, Track>,
    next_id: u64,
    total_ever_created: usize,
    /// detections farther than this (meters) from every live track start a
    /// new track rather than associating with the nearest one.
    gating_distance: f64,
}

impl ConstantVelocityTracker {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            tracks: BTreeMap::new(),
            next_id: 0,
            total_ever_created: 0,
            gating_distance: 1.0,
        }
    }

    pub fn with_gating_distance(mut self, meters: f64) -> Self {
        self.gating_distance = meters;
        self
    }

    fn next_gid(&mut self) -> String {
        let id = format!("{}-{}", self.category, self.next_id);
        self.next_id += 1;
        self.total_ever_created += 1;
        id
    }

    fn nearest_track(&self, loc: Point3<f64>) -> Option<String> {
        self.tracks
            .iter()
            .map(|(gid, t)| (gid.clone(), (t.object.scene_loc - loc).norm()))
            .filter(|(_, d)| *d <= self.gating_distance)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .map(|(gid, _)| gid)
    }
}

impl Tracker for ConstantVelocityTracker {
    fn track_objects(
        &mut self,
        new: Vec<TrackerInput>,
        already_tracked: Vec<TrackedObject>,
        when: f64,
    ) {
        for input in new {
            match self.nearest_track(input.loc) {
                Some(gid) => {
                    let track = self.tracks.get_mut(&gid).unwrap();
                    let dt = (when - track.object.when).max(f64::EPSILON);
                    let displacement = input.loc - track.object.scene_loc;
                    track.object.velocity = Point3::from(displacement / dt);
                    track.object.scene_loc = input.loc;
                    track.object.when = when;
                    track.object.frame_count += 1;
                    if !track.object.visibility.contains(&input.camera_id) {
                        track.object.visibility.push(input.camera_id);
                    }
                    if input.bounding_box.is_some() {
                        track.object.bounding_box = input.bounding_box;
                    }
                }
                None => {
                    let gid = self.next_gid();
                    let mut object = TrackedObject::new(gid.clone(), self.category.clone(), input.loc, when);
                    object.frame_count = 1;
                    object.visibility.push(input.camera_id);
                    object.bounding_box = input.bounding_box;
                    self.tracks.insert(gid, Track { object });
                }
            }
        }

        for already in already_tracked {
            self.tracks
                .entry(already.gid.clone())
                .or_insert_with(|| Track { object: already.clone() })
                .object = already;
        }
    }

    fn current_objects(&self) -> Vec<TrackedObject> {
        self.tracks.values().map(|t| t.object.clone()).collect()
    }

    fn unique_id_count(&self) -> usize {
        self.total_ever_created
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_velocity_estimate_converges() {
        let mut tracker = ConstantVelocityTracker::new("person");
        let mut t = 0.0;
        let mut pos = Point3::new(0.0, 0.0, 0.0);
        for _ in 0..100 {
            tracker.track_objects(
                vec![TrackerInput::new(pos, "cam1".into(), t)],
                vec![],
                t,
            );
            t += 0.1;
            pos = Point3::new(pos.x + 0.2, pos.y + 0.1, 0.0);
        }
        let objs = tracker.current_objects();
        assert_eq!(objs.len(), 1);
        let obj = &objs[0];
        approx::assert_relative_eq!(obj.velocity.x, 2.0, epsilon = 0.02);
        approx::assert_relative_eq!(obj.velocity.y, 1.0, epsilon = 0.02);
        assert!(obj.frame_count > 90);
    }

    #[test]
    fn distant_detection_starts_a_new_track() {
        let mut tracker = ConstantVelocityTracker::new("person");
        tracker.track_objects(vec![TrackerInput::new(Point3::new(0.0, 0.0, 0.0), "cam1".into(), 0.0)], vec![], 0.0);
        tracker.track_objects(vec![TrackerInput::new(Point3::new(50.0, 50.0, 0.0), "cam1".into(), 0.1)], vec![], 0.1);
        assert_eq!(tracker.current_objects().len(), 2);
        assert_eq!(tracker.unique_id_count(), 2);
    }
}
