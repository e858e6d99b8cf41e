//! Scene ingest and event evaluation (spec §4.3), grounded on `scene.py`'s
//! `Scene.processCameraData` / `processSceneData` / `processSensorData` /
//! `_updateEvents` family. `TrackedObject::chain_data` coming back from a
//! [`TrackerFacade`] is a point-in-time snapshot (the worker thread owns the
//! canonical copy), so this module keeps the authoritative, cross-tick
//! `chain_data` itself, keyed by `gid`, and stamps it onto each snapshot before
//! evaluating events — the Python original mutates the same object in place
//! across ticks, which a message-passing worker boundary can't give us for free.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use nalgebra::{Point2, Point3};
use parking_lot::RwLock;

use scene_geometry::{Polygon, RegionMesh};
use scene_tracking::{ChainData, RegionEntry, TrackedObject};
use scene_types::{Detection, DetectorMessage, Location, Scene, SingletonSensorMessage};

use crate::builders::pixel_box_to_meter_plane;
use crate::error::{CoreError, Result};
use crate::facade::TrackerFacade;

/// spec §4.3.6: region/tripwire state changes are only published when at
/// least this long has passed since the last publish for that entity.
pub const DEBOUNCE_DELAY: f64 = 0.5;

/// Rough footprint used for the region-mesh intersection test (spec §4.3.6);
/// tracked objects here are points, not full 3D meshes (see module docs).
const OBJECT_MESH_HALF_EXTENT: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct RegionEvent {
    pub region_uid: String,
    pub entered: Vec<TrackedObject>,
    pub exited: Vec<(TrackedObject, f64)>,
    pub current: Vec<TrackedObject>,
    pub count_changed: bool,
}

#[derive(Debug, Clone)]
pub struct TripwireEvent {
    pub tripwire_uid: String,
    pub crossers: Vec<(TrackedObject, i8)>,
}

#[derive(Debug, Clone, Default)]
pub struct SceneEvents {
    pub regions: Vec<RegionEvent>,
    pub tripwires: Vec<TripwireEvent>,
}

/// Binds a [`scene_types::Scene`] config handle to its [`TrackerFacade`] and
/// the cross-tick chain-data store (spec §4.3).
pub struct SceneRuntime {
    pub handle: Arc<RwLock<Scene>>,
    pub facade: Arc<TrackerFacade>,
    chain_data: RwLock<BTreeMap<String, ChainData>>,
}

impl SceneRuntime {
    pub fn new(handle: Arc<RwLock<Scene>>, facade: Arc<TrackerFacade>) -> Arc<Self> {
        Arc::new(Self { handle, facade, chain_data: RwLock::new(BTreeMap::new()) })
    }

    fn visible_cameras(&self, scene: &Scene, loc: Point3<f64>) -> Vec<String> {
        let mut cameras = Vec::new();
        for (camera_id, camera) in &scene.cameras {
            let Some(pose) = camera.pose.as_deref() else { continue };
            let px = pose.project_3d_to_pixel(loc);
            if px.x >= 0.0 && px.y >= 0.0 && px.x < pose.width() as f64 && px.y < pose.height() as f64 {
                cameras.push(camera_id.clone());
            }
        }
        cameras
    }

    /// spec §4.3.3 `processCameraData`. Returns `None` when the camera has no
    /// pose yet (discarded silently); otherwise the events evaluated for every
    /// detection category present in the message, keyed by category, so the
    /// caller can run its publish step per spec §4.5.3 without recomputing them.
    pub fn process_camera_data(self: &Arc<Self>, msg: &DetectorMessage, when: f64) -> Result<Option<BTreeMap<String, SceneEvents>>> {
        let (pose, use_tracker) = {
            let mut scene = self.handle.write();
            let camera = scene
                .cameras
                .get(&msg.id)
                .cloned()
                .ok_or_else(|| CoreError::UnknownCamera(msg.id.clone()))?;
            if let Some(fr) = msg.frame_rate {
                scene.observe_frame_rate(fr);
            }
            let Some(pose) = camera.pose.clone() else {
                return Ok(None); // no pose: discard silently (spec §4.3.3 step 2)
            };
            (pose, scene.use_tracker)
        };

        let mut events = BTreeMap::new();
        for (detection_type, detections) in &msg.objects {
            let mut inputs = Vec::with_capacity(detections.len());
            for raw in detections {
                let mut detection = raw.clone();
                if detection.bounding_box.is_none() {
                    if let Some(px) = detection.bounding_box_px {
                        let plane = pixel_box_to_meter_plane(&pose, px[0], px[1], px[2], px[3]);
                        detection.bounding_box = Some([plane.x, plane.y, plane.w, plane.h]);
                    }
                }
                if let Some(input) = self.tracker_input_from_detection(&detection, &msg.id, when) {
                    inputs.push(input);
                }
            }
            self.facade.track_objects(detection_type, &msg.id, inputs, vec![], when);
            events.insert(detection_type.clone(), self.update_events(detection_type, when, use_tracker));
        }
        Ok(Some(events))
    }

    fn tracker_input_from_detection(&self, detection: &Detection, camera_id: &str, when: f64) -> Option<scene_tracking::TrackerInput> {
        match detection.location {
            Some(Location::Translation(t)) => {
                Some(self.facade.create_object(Point3::new(t[0], t[1], t[2]), camera_id, when).with_bounding_box(detection.bounding_box))
            }
            _ => None,
        }
    }

    /// spec §4.3.4 `processSceneData`: apply the child's 4x4 pose, convert LLA
    /// inputs to ECEF first, strip `reid`, and route by `child.retrack`.
    pub fn process_scene_data(
        self: &Arc<Self>,
        detections: &[Detection],
        child_pose: &nalgebra::Matrix4<f64>,
        detection_type: &str,
        camera_id: &str,
        retrack: bool,
        when: f64,
    ) -> Result<SceneEvents> {
        let use_tracker = self.handle.read().use_tracker;
        let mut new = Vec::new();
        let mut already_tracked = Vec::new();

        for detection in detections {
            let local = match detection.location {
                Some(Location::Translation(t)) => Point3::new(t[0], t[1], t[2]),
                Some(Location::LatLongAlt([lat, lon, alt])) => {
                    scene_geometry::lla_to_ecef(scene_geometry::Lla { lat, lon, alt })
                }
                None => continue,
            };
            let h = child_pose * local.to_homogeneous();
            let transformed = Point3::new(h.x, h.y, h.z);

            if retrack {
                new.push(self.facade.create_object(transformed, camera_id, when).with_bounding_box(detection.bounding_box));
            } else {
                let gid = detection.id.clone().unwrap_or_default();
                let mut obj = TrackedObject::new(gid, detection_type.to_string(), transformed, when);
                obj.frame_count = 4; // already-tracked objects bypass the reliability gate
                obj.bounding_box = detection.bounding_box;
                already_tracked.push(obj);
            }
        }

        self.facade.track_objects(detection_type, camera_id, new, already_tracked, when);
        Ok(self.update_events(detection_type, when, use_tracker))
    }

    /// spec §4.3.5 `processSensorData`. Returns `false` (reported, not fatal)
    /// for unknown sensor ids or stale (`when <= lastWhen`) readings.
    pub fn process_sensor_data(&self, msg: &SingletonSensorMessage, when_epoch: f64) -> Result<bool> {
        let mut scene = self.handle.write();
        let sensor = scene
            .sensors
            .get_mut(&msg.id)
            .ok_or_else(|| CoreError::UnknownSensor(msg.id.clone()))?;

        if let Some(last) = sensor.last_when {
            if when_epoch <= crate::time::datetime_to_epoch(last) {
                return Ok(true); // stale reading, silently discarded
            }
        }

        sensor.last_value = sensor.value;
        sensor.value = Some(msg.value);
        sensor.last_when = Some(crate::time::epoch_to_datetime(when_epoch));

        let sensor_id = msg.id.clone();
        let mut chain_data = self.chain_data.write();
        for region in scene.regions.values() {
            if region.uid != sensor_id {
                continue;
            }
            for gids in region.objects.values() {
                for gid in gids {
                    let entry = chain_data.entry(gid.clone()).or_default();
                    let series = entry.sensors.entry(sensor_id.clone()).or_default();
                    if !series.iter().any(|(ts, _)| *ts == when_epoch) {
                        series.push((when_epoch, msg.value));
                    }
                }
            }
        }
        Ok(true)
    }

    /// spec §4.3.6 `updateEvents`: regions, sensor-regions, then tripwires.
    pub fn update_events(self: &Arc<Self>, detection_type: &str, now: f64, use_tracker: bool) -> SceneEvents {
        let mut objects = self.facade.current_objects(detection_type);

        {
            let scene = self.handle.read();
            for obj in &mut objects {
                obj.visibility = self.visible_cameras(&scene, obj.scene_loc);
            }
        }

        {
            let mut chain_data = self.chain_data.write();
            for obj in &mut objects {
                let chain = chain_data.entry(obj.gid.clone()).or_default();
                chain.published_locations.push_front(obj.scene_loc);
                chain.published_locations.truncate(16);
                obj.chain_data = chain.clone();
            }
        }

        let mut events = SceneEvents::default();
        let mut scene = self.handle.write();
        self.update_region_events(&mut scene, detection_type, now, &objects, use_tracker, &mut events);
        self.update_tripwire_events(&mut scene, detection_type, now, &objects, &mut events);
        events
    }

    fn update_region_events(
        &self,
        scene: &mut Scene,
        detection_type: &str,
        now: f64,
        objects: &[TrackedObject],
        use_tracker: bool,
        events: &mut SceneEvents,
    ) {
        let mut chain_data = self.chain_data.write();

        for (region_uid, region) in scene.regions.iter_mut() {
            let polygon = Polygon::new(region.polygon.iter().map(|p| Point2::new(p[0], p[1])).collect());
            let mesh = if region.compute_intersection {
                RegionMesh::from_polygon(&polygon, region.height.unwrap_or(2.0))
            } else {
                None
            };

            let current: Vec<TrackedObject> = objects
                .iter()
                .filter(|obj| obj.is_reliable(use_tracker))
                .filter(|obj| {
                    let loc2 = Point2::new(obj.scene_loc.x, obj.scene_loc.y);
                    polygon.contains(loc2)
                        || mesh.as_ref().is_some_and(|m| m.intersects(&RegionMesh::object_aabb(obj.scene_loc, OBJECT_MESH_HALF_EXTENT)))
                })
                .cloned()
                .collect();

            let prior_gids: BTreeSet<String> = region.objects.get(detection_type).cloned().unwrap_or_default().into_iter().collect();
            let current_gids: BTreeSet<String> = current.iter().map(|o| o.gid.clone()).collect();

            let new_gids: Vec<&String> = current_gids.difference(&prior_gids).collect();
            let old_gids: Vec<&String> = prior_gids.difference(&current_gids).collect();

            for gid in &new_gids {
                chain_data.entry((*gid).clone()).or_default().regions.insert(region_uid.clone(), RegionEntry { entered: now });
            }

            if region.value.is_some() {
                for gid in &new_gids {
                    chain_data.entry((*gid).clone()).or_default().sensors.entry(region_uid.clone()).or_default();
                }
            }

            let since_last = region.when.map(|w| now - w).unwrap_or(f64::INFINITY);
            if (!new_gids.is_empty() || !old_gids.is_empty()) && since_last > DEBOUNCE_DELAY {
                let entered: Vec<TrackedObject> = current.iter().filter(|o| new_gids.contains(&&o.gid)).cloned().collect();
                let mut exited = Vec::new();
                for gid in &old_gids {
                    let entered_at = chain_data.get(*gid).and_then(|c| c.regions.get(region_uid)).map(|e| e.entered);
                    if let Some(entered_at) = entered_at {
                        if let Some(ghost) = objects.iter().find(|o| &&o.gid == gid) {
                            exited.push((ghost.clone(), now - entered_at));
                        }
                    }
                    if let Some(chain) = chain_data.get_mut(*gid) {
                        chain.regions.remove(region_uid);
                        if region.value.is_some() {
                            chain.sensors.remove(region_uid);
                        }
                    }
                }

                events.regions.push(RegionEvent {
                    region_uid: region_uid.clone(),
                    entered,
                    exited,
                    current: current.clone(),
                    count_changed: current_gids.len() != prior_gids.len(),
                });

                region.objects.insert(detection_type.to_string(), current.iter().map(|o| o.gid.clone()).collect());
                region.when = Some(now);
            }
        }
    }

    fn update_tripwire_events(
        &self,
        scene: &mut Scene,
        detection_type: &str,
        now: f64,
        objects: &[TrackedObject],
        events: &mut SceneEvents,
    ) {
        for (tripwire_uid, tripwire) in scene.tripwires.iter_mut() {
            if tripwire.polyline.len() < 2 {
                continue;
            }
            let wire = scene_geometry::Tripwire::new(
                Point2::new(tripwire.polyline[0][0], tripwire.polyline[0][1]),
                Point2::new(tripwire.polyline[1][0], tripwire.polyline[1][1]),
            );

            let mut crossers = Vec::new();
            for obj in objects {
                if obj.frame_count <= 3 {
                    continue;
                }
                let Some((from, to)) = obj.last_two_locations() else { continue };
                if let Some(d) = wire.crossing_direction(Point2::new(from.x, from.y), Point2::new(to.x, to.y)) {
                    if d != 0 {
                        crossers.push((obj.clone(), d));
                    }
                }
            }

            let prior_count = tripwire.objects.get(detection_type).map(|v| v.len()).unwrap_or(0);
            let since_last = tripwire.when.map(|w| now - w).unwrap_or(f64::INFINITY);
            if prior_count != crossers.len() && since_last > DEBOUNCE_DELAY {
                tripwire.objects.insert(detection_type.to_string(), crossers.iter().map(|(o, _)| o.gid.clone()).collect());
                tripwire.when = Some(now);
                events.tripwires.push(TripwireEvent { tripwire_uid: tripwire_uid.clone(), crossers });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::TrackerFacade;
    use scene_tracking::{ConstantVelocityTracker, Tracker, TrackerInput};
    use scene_types::Region;
    use std::sync::Arc;

    fn runtime_with_region() -> Arc<SceneRuntime> {
        let mut scene = Scene::new("s1".into(), "Scene".into());
        scene.regions.insert(
            "r1".into(),
            Region::new("r1".into(), "Room".into(), vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]]),
        );
        let handle = Arc::new(RwLock::new(scene));
        let factory: crate::facade::TrackerFactory = Arc::new(|c: &str| Box::new(ConstantVelocityTracker::new(c)) as Box<dyn Tracker>);
        let facade = TrackerFacade::direct(factory);
        SceneRuntime::new(handle, facade)
    }

    #[test]
    fn object_entering_region_produces_region_event() {
        let runtime = runtime_with_region();
        let input = TrackerInput::new(Point3::new(5.0, 5.0, 0.0), "cam1".into(), 0.0);
        runtime.facade.track_objects("person", "cam1", vec![input], vec![], 0.0);
        std::thread::sleep(std::time::Duration::from_millis(20));

        let events = runtime.update_events("person", 1.0, true);
        assert_eq!(events.regions.len(), 1);
        assert_eq!(events.regions[0].region_uid, "r1");
        assert_eq!(events.regions[0].entered.len(), 1);
    }

    #[test]
    fn debounce_suppresses_rapid_repeat_events() {
        let runtime = runtime_with_region();
        let input = TrackerInput::new(Point3::new(5.0, 5.0, 0.0), "cam1".into(), 0.0);
        runtime.facade.track_objects("person", "cam1", vec![input], vec![], 0.0);
        std::thread::sleep(std::time::Duration::from_millis(20));

        let first = runtime.update_events("person", 1.0, true);
        assert_eq!(first.regions.len(), 1);
        let second = runtime.update_events("person", 1.1, true);
        assert!(second.regions.is_empty());
    }
}
