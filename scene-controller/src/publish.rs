//! Publication pipeline (spec §4.5.3), grounded on `scene_controller.py`'s
//! `publishDetections` / `publishSceneDetections` / `publishExternalDetections`
//! / `publishRegulatedDetections` / `publishEvents` family.
//!
//! The per-region occupant data stream (`publishRegionDetections` in the
//! original) is not reproduced here: it has no topic of its own in
//! `scene_types::topics`, and the membership it would carry is already
//! visible on every published detection via `chain_data.regions`, so it would
//! be a pure duplicate of information `publish_events` already sends.

use std::collections::BTreeMap;

use chrono::Utc;
use rumqttc::QoS;
use scene_core::{attach_primary_camera_bounds, build_detections_list, SceneEvents};
use scene_types::messages::{EventOutput, ExitedObject, RegulatedOutput};
use scene_types::{topics, Scene, SingletonSensorMessage};
use serde_json::{json, Value};

use crate::controller::Controller;
use crate::error::Result;
use crate::handlers::CameraIngest;

/// spec §4.5.2 step 8: publish everything a processed moving-object message
/// produces — per-category detections, the regulated fan-out, and events.
pub fn publish_camera_ingest(controller: &Controller, ingest: &CameraIngest) -> Result<()> {
    for (category, events) in &ingest.events_by_category {
        let objects = ingest.runtime.facade.current_objects(category);
        publish_scene_detections(controller, &ingest.scene, category, &objects, ingest.camera_id.as_deref())?;
        publish_regulated_detections(controller, &ingest.scene, category, &objects, ingest.camera_id.as_deref())?;
        publish_events(controller, &ingest.scene, events)?;
    }
    Ok(())
}

fn scene_should_publish(controller: &Controller, scene_uid: &str, key: &str, len: usize) -> bool {
    let mut state = controller.output_state.lock();
    let entry = state.entry(scene_uid.to_string()).or_default();
    let last = entry.last_pub_count.get(key).copied();
    let should = len > 0 || last.map_or(true, |c| c > 0);
    entry.last_pub_count.insert(key.to_string(), len);
    should
}

/// spec §4.5.3 `publishSceneDetections` + `publishExternalDetections`.
fn publish_scene_detections(
    controller: &Controller,
    scene_handle: &std::sync::Arc<parking_lot::RwLock<Scene>>,
    category: &str,
    objects: &[scene_tracking::TrackedObject],
    _camera_id: Option<&str>,
) -> Result<()> {
    let scene = scene_handle.read();
    let detections = build_detections_list(&scene, objects);
    scene_core::Metrics::global().set_objects_tracked(detections.len() as u64);
    let key = format!("{}/{}", scene.name, category);
    if !scene_should_publish(controller, &scene.uid, &key, detections.len()) {
        return Ok(());
    }

    let payload = json!({
        "id": scene.uid,
        "name": scene.name,
        "timestamp": Utc::now(),
        "objects": detections,
    });
    let topic = topics::scene_data(&scene.uid, category);
    controller.client.publish(topic, QoS::AtMostOnce, false, serde_json::to_vec(&payload)?)?;

    publish_external_detections(controller, &scene, category, &payload)?;
    Ok(())
}

/// spec §4.5.3: rate-limited republish of the already-serialized scene
/// payload on the child-to-parent external topic.
fn publish_external_detections(controller: &Controller, scene: &Scene, category: &str, payload: &Value) -> Result<()> {
    let now = Utc::now().timestamp() as f64;
    let mut state = controller.output_state.lock();
    let entry = state.entry(scene.uid.clone()).or_default();
    let last = entry.last_external_pub.get(category).copied();
    let interval = if scene.external_update_rate > 0.0 { 1.0 / scene.external_update_rate } else { 0.0 };
    if last.is_some_and(|l| now - l < interval) {
        return Ok(());
    }
    entry.last_external_pub.insert(category.to_string(), now);
    drop(state);

    let topic = topics::external_data(&scene.uid, category);
    controller.client.publish(topic, QoS::AtMostOnce, false, serde_json::to_vec(payload)?)?;
    Ok(())
}

/// spec §4.5.3 `publishRegulatedDetections`: debounced snapshot across every
/// category seen so far for this scene, with a moving-average `scene_rate`.
fn publish_regulated_detections(
    controller: &Controller,
    scene_handle: &std::sync::Arc<parking_lot::RwLock<Scene>>,
    category: &str,
    objects: &[scene_tracking::TrackedObject],
    camera_id: Option<&str>,
) -> Result<()> {
    let scene = scene_handle.read();
    let mut built = build_detections_list(&scene, objects);
    if controller.config.visibility_topic == "regulated" {
        for (detection, obj) in built.iter_mut().zip(objects) {
            attach_primary_camera_bounds(&scene, obj, detection);
        }
    }
    let detections: Vec<Value> = built.into_iter().map(serde_json::to_value).collect::<std::result::Result<_, _>>()?;

    let now = Utc::now().timestamp() as f64;
    let scene_hz = {
        let mut rate = controller.regulate_rate.lock();
        rate.tick(now);
        rate.hz()
    };

    let mut state = controller.output_state.lock();
    let entry = &mut state.entry(scene.uid.clone()).or_default().regulate;
    entry.objects.insert(category.to_string(), detections);
    if let Some(camera_id) = camera_id {
        entry.rate.insert(camera_id.to_string(), scene_hz);
    }

    let interval = if scene.regulated_rate > 0.0 { 1.0 / scene.regulated_rate } else { 0.0 };
    if entry.last.is_some_and(|l| now - l < interval) {
        return Ok(());
    }
    entry.last = Some(now);

    let payload = RegulatedOutput {
        timestamp: Utc::now(),
        objects: entry.objects.clone(),
        id: scene.uid.clone(),
        name: scene.name.clone(),
        scene_rate: (scene_hz * 10.0).round() / 10.0,
        rate: entry.rate.clone(),
    };
    drop(state);

    let topic = topics::regulated_data(&scene.uid);
    controller.client.publish(topic, QoS::AtMostOnce, false, serde_json::to_vec(&payload)?)?;
    Ok(())
}

/// spec §4.5.3 / §4.3.6 `publishEvents`: one message per region/tripwire that
/// changed this tick. Regions that changed occupancy publish under event
/// type `objects`; a count change on top of that also publishes `count`.
fn publish_events(controller: &Controller, scene_handle: &std::sync::Arc<parking_lot::RwLock<Scene>>, events: &SceneEvents) -> Result<()> {
    let scene = scene_handle.read();
    let now = Utc::now();

    for region_event in &events.regions {
        let Some(region) = scene.regions.get(&region_event.region_uid) else { continue };

        let objects: Vec<Value> = build_detections_list(&scene, &region_event.current).into_iter().map(serde_json::to_value).collect::<std::result::Result<_, _>>()?;
        let entered: Vec<Value> = build_detections_list(&scene, &region_event.entered).into_iter().map(serde_json::to_value).collect::<std::result::Result<_, _>>()?;
        let exited = region_event
            .exited
            .iter()
            .map(|(obj, dwell)| -> Result<ExitedObject> {
                let det = build_detections_list(&scene, std::slice::from_ref(obj));
                Ok(ExitedObject { object: serde_json::to_value(det.into_iter().next())?, dwell: *dwell })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut counts = BTreeMap::new();
        counts.insert("current".to_string(), region_event.current.len());

        let mut metadata = BTreeMap::new();
        metadata.insert("name".to_string(), Value::String(region.name.clone()));
        metadata.insert("fromSensor".to_string(), Value::Bool(region.value.is_some()));

        let payload = EventOutput {
            timestamp: now,
            scene_id: scene.uid.clone(),
            scene_name: scene.name.clone(),
            region_id: Some(region.uid.clone()),
            region_name: Some(region.name.clone()),
            tripwire_id: None,
            tripwire_name: None,
            counts: counts.clone(),
            objects,
            entered,
            exited,
            value: region.value,
            metadata: metadata.clone(),
        };

        let topic = topics::region_event("objects", &scene.uid, &region.uid);
        controller.client.publish(topic, QoS::AtMostOnce, false, serde_json::to_vec(&payload)?)?;

        if region_event.count_changed {
            let topic = topics::region_event("count", &scene.uid, &region.uid);
            controller.client.publish(topic, QoS::AtMostOnce, false, serde_json::to_vec(&payload)?)?;
        }
    }

    for tripwire_event in &events.tripwires {
        let Some(tripwire) = scene.tripwires.get(&tripwire_event.tripwire_uid) else { continue };
        let crossers: Vec<scene_tracking::TrackedObject> = tripwire_event.crossers.iter().map(|(o, _)| o.clone()).collect();
        let objects: Vec<Value> = build_detections_list(&scene, &crossers).into_iter().map(serde_json::to_value).collect::<std::result::Result<_, _>>()?;

        let mut counts = BTreeMap::new();
        counts.insert("current".to_string(), crossers.len());
        let mut metadata = BTreeMap::new();
        metadata.insert("name".to_string(), Value::String(tripwire.name.clone()));

        let payload = EventOutput {
            timestamp: now,
            scene_id: scene.uid.clone(),
            scene_name: scene.name.clone(),
            region_id: None,
            region_name: None,
            tripwire_id: Some(tripwire.uid.clone()),
            tripwire_name: Some(tripwire.name.clone()),
            counts,
            objects: objects.clone(),
            entered: objects,
            exited: vec![],
            value: None,
            metadata,
        };

        let topic = topics::tripwire_event("objects", &scene.uid, &tripwire.uid);
        controller.client.publish(topic, QoS::AtMostOnce, false, serde_json::to_vec(&payload)?)?;
    }

    Ok(())
}

/// spec §4.5.2 `handleSensorMessage`'s publish step: a minimal event built
/// directly from the matched singleton region's value, since sensor readings
/// have no tracked objects of their own to run through `publish_events`.
pub fn publish_sensor_event(controller: &Controller, scene_handle: &std::sync::Arc<parking_lot::RwLock<Scene>>, msg: &SingletonSensorMessage) -> Result<()> {
    let scene = scene_handle.read();
    let Some(region) = scene.regions.values().find(|r| r.uid == msg.id) else {
        return Ok(());
    };

    let mut metadata = BTreeMap::new();
    metadata.insert("name".to_string(), Value::String(region.name.clone()));
    metadata.insert("fromSensor".to_string(), Value::Bool(true));

    let payload = EventOutput {
        timestamp: msg.timestamp,
        scene_id: scene.uid.clone(),
        scene_name: scene.name.clone(),
        region_id: Some(region.uid.clone()),
        region_name: Some(region.name.clone()),
        tripwire_id: None,
        tripwire_name: None,
        counts: BTreeMap::new(),
        objects: vec![],
        entered: vec![],
        exited: vec![],
        value: Some(msg.value),
        metadata,
    };

    let topic = topics::region_event("value", &scene.uid, &region.uid);
    controller.client.publish(topic, QoS::AtMostOnce, false, serde_json::to_vec(&payload)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    use parking_lot::RwLock;
    use rumqttc::MqttOptions;
    use scene_core::adapter::{AssetClasses, CameraPatch, DataSource};
    use scene_core::RegionEvent;
    use scene_tracking::TrackedObject;
    use scene_types::Region;

    use crate::controller::ControllerConfig;
    use crate::ntp::SystemOffsetSource;

    struct EmptySource;

    impl DataSource for EmptySource {
        fn get_scenes(&self) -> scene_core::Result<Vec<Scene>> {
            Ok(vec![])
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

    fn test_controller() -> Arc<Controller> {
        let source: Arc<dyn DataSource> = Arc::new(EmptySource);
        let cache = Arc::new(scene_core::CacheManager::new(source.clone(), scene_core::CacheManagerConfig::default()).unwrap());
        let (client, _connection) = rumqttc::Client::new(MqttOptions::new("test", "localhost", 1883), 64);
        Controller::new(
            client,
            cache,
            source,
            Arc::new(SystemOffsetSource),
            ControllerConfig { rewrite_bad_time: false, rewrite_all_time: false, max_lag: 5.0, visibility_topic: "unregulated".into() },
        )
    }

    fn tracked_object(gid: &str, category: &str, x: f64, y: f64) -> TrackedObject {
        let mut obj = TrackedObject::new(gid.to_string(), category.to_string(), nalgebra::Point3::new(x, y, 0.0), 0.0);
        obj.frame_count = 4;
        obj
    }

    #[test]
    fn scene_should_publish_announces_drop_to_zero_then_suppresses() {
        let controller = test_controller();
        assert!(scene_should_publish(&controller, "s1", "s1/person", 3));
        assert!(scene_should_publish(&controller, "s1", "s1/person", 0), "first empty tick still announces the drop");
        assert!(!scene_should_publish(&controller, "s1", "s1/person", 0), "repeat empty ticks are suppressed");
        assert!(scene_should_publish(&controller, "s1", "s1/person", 1), "resumes once nonempty again");
    }

    #[test]
    fn publish_scene_detections_records_the_published_count() {
        let controller = test_controller();
        let scene = Arc::new(RwLock::new(Scene::new("s1".into(), "Scene".into())));
        let objects = vec![tracked_object("o1", "person", 1.0, 2.0)];

        publish_scene_detections(&controller, &scene, "person", &objects, None).unwrap();

        let state = controller.output_state.lock();
        assert_eq!(state.get("s1").unwrap().last_pub_count.get("s1/person"), Some(&1));
    }

    #[test]
    fn publish_regulated_detections_gates_on_the_scenes_rate() {
        let controller = test_controller();
        let scene = Arc::new(RwLock::new(Scene::new("s1".into(), "Scene".into())));
        let objects = vec![tracked_object("o1", "person", 1.0, 2.0)];

        publish_regulated_detections(&controller, &scene, "person", &objects, Some("cam1")).unwrap();
        let first_publish = controller.output_state.lock().get("s1").unwrap().regulate.last;

        // immediate second tick: regulated_rate defaults to 1 Hz, so this is gated
        publish_regulated_detections(&controller, &scene, "person", &objects, Some("cam1")).unwrap();
        let second_publish = controller.output_state.lock().get("s1").unwrap().regulate.last;

        assert_eq!(first_publish, second_publish, "gated tick must not advance the last-published timestamp");
        assert_eq!(controller.output_state.lock().get("s1").unwrap().regulate.objects.get("person").unwrap().len(), 1);
    }

    #[test]
    fn publish_events_skips_region_events_for_regions_no_longer_in_the_scene() {
        let controller = test_controller();
        let scene = Arc::new(RwLock::new(Scene::new("s1".into(), "Scene".into())));
        let events = SceneEvents {
            regions: vec![RegionEvent { region_uid: "missing".into(), entered: vec![], exited: vec![], current: vec![], count_changed: false }],
            tripwires: vec![],
        };
        // the region isn't in the scene: must not panic or error, just skip it
        publish_events(&controller, &scene, &events).unwrap();
    }

    #[test]
    fn publish_events_builds_payloads_for_a_changed_region() {
        let controller = test_controller();
        let mut scene = Scene::new("s1".into(), "Scene".into());
        scene.regions.insert("r1".into(), Region::new("r1".into(), "Room".into(), vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]]));
        let scene = Arc::new(RwLock::new(scene));

        let obj = tracked_object("o1", "person", 5.0, 5.0);
        let events = SceneEvents {
            regions: vec![RegionEvent { region_uid: "r1".into(), entered: vec![obj.clone()], exited: vec![], current: vec![obj], count_changed: true }],
            tripwires: vec![],
        };

        publish_events(&controller, &scene, &events).unwrap();
    }
}
