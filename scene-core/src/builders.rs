//! Detection Builders (spec §4.6): projects [`TrackedObject`]s into the wire
//! shape `scene_types::messages` defines, grounded on `scene.py`'s
//! `_buildDetectionsList`-equivalent serialization and `mvg`'s pixel-plane
//! reprojection for `computeCameraBounds`.

use std::collections::BTreeMap;

use nalgebra::Point3;
use scene_geometry::{apply_trs_xyz_to_lla, CameraPose, PixelBox, PlaneBox};
use scene_tracking::{ChainData, TrackedObject};

use scene_types::{Camera, Detection, Location, Scene};

/// spec §4.3.3 step 4: undistort a pixel box to the normalized image plane.
/// A thin wrapper over [`CameraPose::undistort_box`] so callers outside
/// `scene-geometry` don't need to hold a `PixelBox` constructor in scope.
pub fn pixel_box_to_meter_plane(pose: &CameraPose<f64>, x: f64, y: f64, w: f64, h: f64) -> PlaneBox {
    pose.undistort_box(PixelBox { x, y, w, h })
}

/// spec §4.6 `buildDetectionsList`: one wire [`Detection`] per tracked object.
pub fn build_detections_list(scene: &Scene, objects: &[TrackedObject]) -> Vec<Detection> {
    objects.iter().map(|obj| build_detection(scene, obj)).collect()
}

/// spec §4.6 `buildDetectionsDict`: the same detections keyed by global id.
pub fn build_detections_dict(scene: &Scene, objects: &[TrackedObject]) -> BTreeMap<String, Detection> {
    objects.iter().map(|obj| (obj.gid.clone(), build_detection(scene, obj))).collect()
}

fn build_detection(scene: &Scene, obj: &TrackedObject) -> Detection {
    let location = if scene.output_lla && scene.lla_ready() {
        scene.trs_xyz_to_lla.map(|m| {
            let lla = apply_trs_xyz_to_lla(&m, obj.scene_loc);
            Location::LatLongAlt([lla.lat, lla.lon, lla.alt])
        })
    } else {
        Some(Location::Translation([obj.scene_loc.x, obj.scene_loc.y, obj.scene_loc.z]))
    };

    Detection {
        id: Some(obj.gid.clone()),
        category: Some(obj.category.clone()),
        location,
        visibility: Some(obj.visibility.clone()),
        bounding_box: obj.bounding_box,
        chain_data: Some(chain_data_to_value(&obj.chain_data)),
        ..Default::default()
    }
}

fn chain_data_to_value(chain_data: &ChainData) -> serde_json::Value {
    let regions: BTreeMap<String, serde_json::Value> = chain_data
        .regions
        .iter()
        .map(|(uid, entry)| (uid.clone(), serde_json::json!({ "entered": crate::time::epoch_to_datetime(entry.entered) })))
        .collect();
    let sensors: BTreeMap<String, Vec<(chrono::DateTime<chrono::Utc>, f64)>> = chain_data
        .sensors
        .iter()
        .map(|(uid, series)| (uid.clone(), series.iter().map(|(ts, v)| (crate::time::epoch_to_datetime(*ts), *v)).collect()))
        .collect();
    let published_locations: Vec<[f64; 3]> = chain_data.published_locations.iter().map(|p| [p.x, p.y, p.z]).collect();

    serde_json::json!({
        "regions": regions,
        "sensors": sensors,
        "published_locations": published_locations,
    })
}

/// spec §4.6 `computeCameraBounds`: reproject the track's meter-plane
/// `bounding_box` into the pixel space of every camera listed in its
/// `visibility`. Cameras without a pose yet, or a track with no bounding box
/// observed, are simply skipped.
pub fn compute_camera_bounds(scene: &Scene, obj: &TrackedObject) -> BTreeMap<String, [f64; 4]> {
    let mut bounds = BTreeMap::new();
    let Some([x, y, w, h]) = obj.bounding_box else { return bounds };
    for camera_id in &obj.visibility {
        let Some(camera) = scene.cameras.get(camera_id) else { continue };
        let Some(pose) = camera_pose(camera) else { continue };
        let px = pose.distort_box(PlaneBox { x, y, w, h });
        bounds.insert(camera_id.clone(), [px.x, px.y, px.w, px.h]);
    }
    bounds
}

/// spec §4.5.3: when the regulated stream is configured to carry per-camera
/// pixel bounds, attach the primary (first-visible) camera's reprojected box
/// to `bounding_box_px`.
pub fn attach_primary_camera_bounds(scene: &Scene, obj: &TrackedObject, detection: &mut Detection) {
    let bounds = compute_camera_bounds(scene, obj);
    detection.bounding_box_px = obj.visibility.first().and_then(|camera_id| bounds.get(camera_id)).copied();
}

fn camera_pose(camera: &Camera) -> Option<&CameraPose<f64>> {
    camera.pose.as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_location_used_when_output_lla_disabled() {
        let scene = Scene::new("s1".into(), "Scene".into());
        let obj = TrackedObject::new("g1".into(), "person".into(), Point3::new(1.0, 2.0, 0.0), 0.0);
        let det = build_detection(&scene, &obj);
        match det.location {
            Some(Location::Translation([x, y, z])) => assert_eq!((x, y, z), (1.0, 2.0, 0.0)),
            other => panic!("expected translation, got {other:?}"),
        }
    }

    #[test]
    fn detections_dict_is_keyed_by_gid() {
        let scene = Scene::new("s1".into(), "Scene".into());
        let objs = vec![
            TrackedObject::new("g1".into(), "person".into(), Point3::origin(), 0.0),
            TrackedObject::new("g2".into(), "person".into(), Point3::origin(), 0.0),
        ];
        let dict = build_detections_dict(&scene, &objs);
        assert!(dict.contains_key("g1") && dict.contains_key("g2"));
    }

    #[test]
    fn build_detection_carries_bounding_box_and_chain_data() {
        let scene = Scene::new("s1".into(), "Scene".into());
        let mut obj = TrackedObject::new("g1".into(), "person".into(), Point3::new(1.0, 2.0, 0.0), 0.0);
        obj.bounding_box = Some([10.0, 20.0, 30.0, 40.0]);
        obj.chain_data.regions.insert("r1".into(), scene_tracking::RegionEntry { entered: 0.0 });

        let det = build_detection(&scene, &obj);
        assert_eq!(det.bounding_box, Some([10.0, 20.0, 30.0, 40.0]));
        let chain_data = det.chain_data.expect("chain_data always attached to outbound detections");
        assert!(chain_data["regions"]["r1"]["entered"].is_string());
    }

    fn test_camera_pose() -> CameraPose<f64> {
        use cam_geom::ExtrinsicParameters;
        use nalgebra::UnitQuaternion;
        use opencv_ros_camera::RosOpenCvIntrinsics;
        let intrinsics = RosOpenCvIntrinsics::from_params(1000.0, 0.0, 1000.0, 320.0, 240.0);
        let extrinsics = ExtrinsicParameters::from_rotation_and_camcenter(UnitQuaternion::identity(), Point3::new(0.0, 0.0, 5.0));
        CameraPose::new(intrinsics, extrinsics, 640, 480)
    }

    #[test]
    fn compute_camera_bounds_is_empty_without_an_observed_box() {
        let mut scene = Scene::new("s1".into(), "Scene".into());
        let mut camera = Camera::new("cam1".into());
        camera.pose = Some(std::sync::Arc::new(test_camera_pose()));
        scene.cameras.insert("cam1".into(), camera);

        let mut obj = TrackedObject::new("g1".into(), "person".into(), Point3::new(0.0, 0.0, 0.0), 0.0);
        obj.visibility.push("cam1".into());
        assert!(compute_camera_bounds(&scene, &obj).is_empty());
    }

    #[test]
    fn attach_primary_camera_bounds_fills_bounding_box_px_for_the_first_visible_camera() {
        let mut scene = Scene::new("s1".into(), "Scene".into());
        let mut camera = Camera::new("cam1".into());
        camera.pose = Some(std::sync::Arc::new(test_camera_pose()));
        scene.cameras.insert("cam1".into(), camera);

        let mut obj = TrackedObject::new("g1".into(), "person".into(), Point3::new(0.0, 0.0, 0.0), 0.0);
        obj.visibility.push("cam1".into());
        obj.bounding_box = Some([0.0, 0.0, 0.1, 0.1]);

        let mut det = build_detection(&scene, &obj);
        assert!(det.bounding_box_px.is_none());
        attach_primary_camera_bounds(&scene, &obj, &mut det);
        assert!(det.bounding_box_px.is_some());
    }
}
