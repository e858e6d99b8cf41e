//! Bus topic string construction, grounded on the topic table in
//! `examples/original_source/controller/src/controller/scene_controller.py`
//! (`TOPIC_*` format strings there) rather than on a teacher file — the
//! teacher workspace has no bus at all.

pub const CMD_DATABASE: &str = "scenescape/cmd/database";

pub fn camera_data(camera_id: &str) -> String {
    format!("scenescape/data/camera/{camera_id}")
}

pub fn sensor_data(sensor_id: &str) -> String {
    format!("scenescape/data/sensor/{sensor_id}")
}

pub fn external_data(scene_uid: &str, category: &str) -> String {
    format!("scenescape/data/external/{scene_uid}/{category}")
}

/// Subscription filter for all categories of a child scene's external feed.
pub fn external_data_wildcard(child_uid: &str) -> String {
    format!("scenescape/data/external/{child_uid}/+")
}

pub fn scene_data(scene_uid: &str, category: &str) -> String {
    format!("scenescape/data/scene/{scene_uid}/{category}")
}

pub fn regulated_data(scene_uid: &str) -> String {
    format!("scenescape/data/regulated/{scene_uid}")
}

pub fn region_event(event_type: &str, scene_uid: &str, region_uid: &str) -> String {
    format!("scenescape/event/region/{event_type}/{scene_uid}/{region_uid}")
}

pub fn tripwire_event(event_type: &str, scene_uid: &str, tripwire_uid: &str) -> String {
    format!("scenescape/event/tripwire/{event_type}/{scene_uid}/{tripwire_uid}")
}

pub fn cmd_scene(scene_uid: &str) -> String {
    format!("scenescape/cmd/scene/{scene_uid}")
}

pub fn childscene_status(remote_child_uid: &str) -> String {
    format!("scenescape/sys/childscene/status/{remote_child_uid}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_match_the_documented_shapes() {
        assert_eq!(camera_data("cam1"), "scenescape/data/camera/cam1");
        assert_eq!(regulated_data("s1"), "scenescape/data/regulated/s1");
        assert_eq!(
            region_event("entered", "s1", "r1"),
            "scenescape/event/region/entered/s1/r1"
        );
    }
}
