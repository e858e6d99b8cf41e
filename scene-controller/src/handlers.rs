//! Bus message handlers (spec §4.5.2), grounded on `scene_controller.py`'s
//! `handleMovingObjectMessage` / `_handleChildSceneObject` / `handleSensorMessage`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use scene_core::{SceneEvents, SceneRuntime};
use scene_types::{DetectorMessage, SingletonSensorMessage};
use tracing::{error, warn};

use crate::controller::Controller;
use crate::error::Result;
use crate::publish;
use crate::subscriptions::IncomingTopic;

/// What a successful `handleMovingObjectMessage` produced, so the caller can
/// feed it straight into the publish pipeline (spec §4.5.2 step 8).
pub struct CameraIngest {
    pub scene: Arc<RwLock<scene_types::Scene>>,
    pub runtime: Arc<SceneRuntime>,
    pub camera_id: Option<String>,
    pub events_by_category: BTreeMap<String, SceneEvents>,
    pub msg_when: f64,
}

/// spec §4.5.2 `handleMovingObjectMessage`. `raw` is the not-yet-typed
/// payload so the `updatecamera` early-bail (a calibration-path message that
/// shares the camera topic) can be checked before committing to a
/// [`DetectorMessage`] deserialization.
pub fn handle_moving_object_message(controller: &Controller, topic: &IncomingTopic, raw: &serde_json::Value) -> Result<Option<CameraIngest>> {
    if raw.get("updatecamera").is_some() {
        return Ok(None);
    }

    let msg: DetectorMessage = serde_json::from_value(raw.clone())?;
    scene_core::Metrics::global().inc_messages_processed();
    let now = Utc::now().timestamp() as f64 + controller.ntp.current_offset();

    if msg.intrinsics.is_some() || msg.distortion.is_some() {
        controller.cache.refresh_for_cam_params(&msg.id, msg.intrinsics.clone(), msg.distortion.clone())?;
    }

    let msg_when = if controller.config.rewrite_all_time {
        now
    } else {
        msg.timestamp.timestamp() as f64 + (msg.timestamp.timestamp_subsec_nanos() as f64) / 1e9
    };

    let lag = (now - msg_when).abs();
    let msg_when = if lag > controller.config.max_lag {
        if !controller.config.rewrite_bad_time {
            warn!(sender = %msg.id, lag, "message fell behind, dropping");
            scene_core::Metrics::global().inc_dropped("fell_behind", &msg.id);
            return Ok(None);
        }
        now
    } else {
        msg_when
    };

    match topic {
        IncomingTopic::Camera { camera_id } => {
            let Some(scene_handle) = controller.cache.scene_with_camera_id(camera_id) else {
                warn!(camera = %camera_id, "unknown sender");
                return Ok(None);
            };
            let runtime = controller.runtime_for(scene_handle.clone());
            let Some(events) = runtime.process_camera_data(&msg, msg_when)? else {
                return Ok(None); // camera has no pose yet: discarded silently
            };
            Ok(Some(CameraIngest { scene: scene_handle, runtime, camera_id: Some(camera_id.clone()), events_by_category: events, msg_when }))
        }
        IncomingTopic::External { scene_uid, .. } => handle_child_scene_object(controller, scene_uid, &msg, msg_when),
        IncomingTopic::Sensor { .. } | IncomingTopic::Database => Ok(None),
    }
}

/// spec §4.5.2 `_handleChildSceneObject`: `sender` is the child scene itself
/// (looked up by its own uid, local or bridged-remote), `scene` is the
/// parent the detections get folded into.
fn handle_child_scene_object(controller: &Controller, sender_id: &str, msg: &DetectorMessage, msg_when: f64) -> Result<Option<CameraIngest>> {
    let sender = match controller.cache.scene_with_id(sender_id) {
        Some(sender) => sender,
        None => {
            if controller.cache.scene_with_remote_child_id(sender_id).is_none() {
                warn!(sender = %sender_id, "unknown child scene sender");
                return Ok(None);
            }
            warn!(sender = %sender_id, "remote child scene has no local scene record to route into");
            return Ok(None);
        }
    };

    let (parent_uid, child_pose, retrack) = {
        let sender = sender.read();
        let Some(parent_uid) = sender.parent.clone() else {
            warn!(sender = %sender.uid, "child scene has no parent");
            return Ok(None);
        };
        let Some(pose) = sender.camera_pose else {
            warn!(sender = %sender.uid, "child scene has no camera_pose");
            return Ok(None);
        };
        (parent_uid, pose, sender.retrack)
    };

    let Some(parent_handle) = controller.cache.scene_with_id(&parent_uid) else {
        warn!(parent = %parent_uid, "unknown parent scene");
        return Ok(None);
    };

    let pose_matrix = nalgebra::Matrix4::from_row_slice(&child_pose);
    let runtime = controller.runtime_for(parent_handle.clone());

    let mut events_by_category = BTreeMap::new();
    for (detection_type, detections) in &msg.objects {
        let events = runtime.process_scene_data(detections, &pose_matrix, detection_type, sender_id, retrack, msg_when)?;
        events_by_category.insert(detection_type.clone(), events);
    }

    Ok(Some(CameraIngest { scene: parent_handle, runtime, camera_id: None, events_by_category, msg_when }))
}

/// spec §4.5.2 `handleSensorMessage`. Sensor readings are published through a
/// minimal region-style event built directly from the matched region's
/// `value`, rather than the tracked-object occupancy machinery used for
/// camera-origin events: a singleton sensor has no tracked objects of its own.
pub fn handle_sensor_message(controller: &Controller, raw: &serde_json::Value) -> Result<()> {
    let msg: SingletonSensorMessage = serde_json::from_value(raw.clone())?;
    let Some(scene_handle) = controller.cache.scene_with_sensor_id(&msg.id) else {
        return Ok(());
    };

    let when = msg.timestamp.timestamp() as f64 + controller.ntp.current_offset();
    let runtime = controller.runtime_for(scene_handle.clone());
    if !runtime.process_sensor_data(&msg, when)? {
        error!(sensor = %msg.id, "sensor processing failed, invalidating cache");
        controller.cache.invalidate();
        return Ok(());
    }

    publish::publish_sensor_event(controller, &scene_handle, &msg)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use chrono::Duration as ChronoDuration;
    use rumqttc::MqttOptions;
    use scene_core::adapter::{AssetClasses, CameraPatch, DataSource};

    use crate::controller::ControllerConfig;
    use crate::ntp::FixedOffsetSource;

    struct FakeSource {
        scenes: StdMutex<Vec<scene_types::Scene>>,
    }

    impl DataSource for FakeSource {
        fn get_scenes(&self) -> scene_core::Result<Vec<scene_types::Scene>> {
            Ok(self.scenes.lock().unwrap().clone())
        }
        fn get_camera(&self, _uid: &str) -> scene_core::Result<Option<scene_types::Camera>> {
            Ok(None)
        }
        fn update_camera(&self, _uid: &str, _patch: &CameraPatch) -> scene_core::Result<bool> {
            Ok(true)
        }
        fn get_assets(&self) -> scene_core::Result<AssetClasses> {
            Ok(Default::default())
        }
        fn get_child_scenes(&self, _scene_uid: &str) -> scene_core::Result<Vec<scene_types::ChildLink>> {
            Ok(vec![])
        }
        fn set_trs_matrix(&self, _scene_uid: &str, _matrix: [f64; 16]) -> scene_core::Result<bool> {
            Ok(true)
        }
    }

    fn test_controller(scenes: Vec<scene_types::Scene>, config: ControllerConfig) -> Arc<Controller> {
        let source: Arc<dyn DataSource> = Arc::new(FakeSource { scenes: StdMutex::new(scenes) });
        let cache = Arc::new(scene_core::CacheManager::new(source.clone(), scene_core::CacheManagerConfig::default()).unwrap());
        let (client, _connection) = rumqttc::Client::new(MqttOptions::new("test", "localhost", 1883), 64);
        Controller::new(client, cache, source, Arc::new(FixedOffsetSource::new(0.0)), config)
    }

    fn default_config() -> ControllerConfig {
        ControllerConfig { rewrite_bad_time: false, rewrite_all_time: false, max_lag: 5.0, visibility_topic: "unregulated".into() }
    }

    fn message_at(id: &str, when: chrono::DateTime<Utc>) -> serde_json::Value {
        json_message(id, when, BTreeMap::new())
    }

    fn json_message(id: &str, when: chrono::DateTime<Utc>, objects: BTreeMap<String, Vec<scene_types::Detection>>) -> serde_json::Value {
        serde_json::to_value(DetectorMessage { id: id.to_string(), timestamp: when, objects, frame_rate: None, intrinsics: None, distortion: None, debug_hmo_start_time: None }).unwrap()
    }

    #[test]
    fn updatecamera_payload_is_ignored_before_parsing() {
        let controller = test_controller(vec![], default_config());
        let raw = serde_json::json!({ "updatecamera": true });
        let topic = IncomingTopic::Camera { camera_id: "cam1".into() };
        assert!(handle_moving_object_message(&controller, &topic, &raw).unwrap().is_none());
    }

    #[test]
    fn unknown_camera_sender_is_dropped() {
        let controller = test_controller(vec![], default_config());
        let raw = message_at("cam-unknown-1", Utc::now());
        let topic = IncomingTopic::Camera { camera_id: "cam-unknown-1".into() };
        assert!(handle_moving_object_message(&controller, &topic, &raw).unwrap().is_none());
    }

    #[test]
    fn stale_message_is_dropped_and_counted_when_not_rewriting() {
        let controller = test_controller(vec![], default_config());
        let stale = Utc::now() - ChronoDuration::seconds(60);
        let raw = message_at("cam-stale-1", stale);
        let topic = IncomingTopic::Camera { camera_id: "cam-stale-1".into() };

        let before = scene_core::Metrics::global().dropped_count("fell_behind", "cam-stale-1");
        assert!(handle_moving_object_message(&controller, &topic, &raw).unwrap().is_none());
        assert_eq!(scene_core::Metrics::global().dropped_count("fell_behind", "cam-stale-1"), before + 1);
    }

    #[test]
    fn stale_message_is_rewritten_instead_of_dropped_when_configured() {
        let mut config = default_config();
        config.rewrite_bad_time = true;
        let controller = test_controller(vec![], config);
        let stale = Utc::now() - ChronoDuration::seconds(60);
        let raw = message_at("cam-stale-2", stale);
        let topic = IncomingTopic::Camera { camera_id: "cam-stale-2".into() };

        let before = scene_core::Metrics::global().dropped_count("fell_behind", "cam-stale-2");
        // still None, since the camera is unknown, but NOT via the lag-drop path
        assert!(handle_moving_object_message(&controller, &topic, &raw).unwrap().is_none());
        assert_eq!(scene_core::Metrics::global().dropped_count("fell_behind", "cam-stale-2"), before);
    }

    #[test]
    fn child_scene_with_no_parent_is_skipped() {
        let mut child = scene_types::Scene::new("child-1".into(), "Child".into());
        child.camera_pose = Some([
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ]);
        let controller = test_controller(vec![child], default_config());
        let raw = message_at("child-1", Utc::now());
        let topic = IncomingTopic::External { scene_uid: "child-1".into(), category: "person".into() };
        assert!(handle_moving_object_message(&controller, &topic, &raw).unwrap().is_none());
    }

    #[test]
    fn child_scene_with_no_camera_pose_is_skipped() {
        let mut child = scene_types::Scene::new("child-2".into(), "Child".into());
        child.parent = Some("parent-2".into());
        let parent = scene_types::Scene::new("parent-2".into(), "Parent".into());
        let controller = test_controller(vec![child, parent], default_config());
        let raw = message_at("child-2", Utc::now());
        let topic = IncomingTopic::External { scene_uid: "child-2".into(), category: "person".into() };
        assert!(handle_moving_object_message(&controller, &topic, &raw).unwrap().is_none());
    }

    #[test]
    fn child_scene_object_routes_into_parent_with_one_event_set_per_category() {
        let mut child = scene_types::Scene::new("child-3".into(), "Child".into());
        child.parent = Some("parent-3".into());
        child.camera_pose = Some([
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ]);
        child.retrack = true;
        let parent = scene_types::Scene::new("parent-3".into(), "Parent".into());
        let controller = test_controller(vec![child, parent], default_config());

        let mut objects = BTreeMap::new();
        objects.insert(
            "person".to_string(),
            vec![scene_types::Detection { location: Some(scene_types::Location::Translation([1.0, 2.0, 0.0])), ..Default::default() }],
        );
        let raw = json_message("child-3", Utc::now(), objects);
        let topic = IncomingTopic::External { scene_uid: "child-3".into(), category: "person".into() };

        let ingest = handle_moving_object_message(&controller, &topic, &raw).unwrap().expect("should route into parent");
        assert_eq!(ingest.scene.read().uid, "parent-3");
        assert!(ingest.camera_id.is_none());
        assert_eq!(ingest.events_by_category.keys().cloned().collect::<Vec<_>>(), vec!["person".to_string()]);
    }
}
