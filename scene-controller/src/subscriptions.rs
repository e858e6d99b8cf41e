//! Subscription-set diffing (spec §4.5.1), grounded on `scene_controller.py`'s
//! `updateSubscriptions`: compute the desired topic set from the cache, diff
//! against what is currently subscribed, subscribe to new topics and
//! unsubscribe from stale ones — never touch an unchanged topic.

use std::collections::BTreeSet;

use rumqttc::{Client, QoS};

use crate::error::Result;

/// What kind of inbound message a subscribed topic carries, so the bus loop
/// can route a `Publish` without re-parsing against every possibility.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Route {
    Camera,
    Sensor,
    ExternalWildcard,
    Database,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Subscription {
    pub topic: String,
    pub route: Route,
}

#[derive(Default)]
pub struct SubscriptionSet {
    current: BTreeSet<Subscription>,
}

impl SubscriptionSet {
    /// Applies a newly-computed desired set, subscribing to additions and
    /// unsubscribing from removals; topics present in both sets are untouched.
    pub fn reconcile(&mut self, client: &Client, desired: BTreeSet<Subscription>) -> Result<()> {
        for stale in self.current.difference(&desired) {
            client.unsubscribe(&stale.topic)?;
            tracing::info!(topic = %stale.topic, "unsubscribed");
        }
        for fresh in desired.difference(&self.current) {
            client.subscribe(&fresh.topic, QoS::AtMostOnce)?;
            tracing::info!(topic = %fresh.topic, "subscribed");
        }
        self.current = desired;
        Ok(())
    }
}

/// Topic shapes this controller subscribes to and must parse back on receipt
/// (spec §6 bus topics); outbound-only shapes (`scene`, `regulated`, events)
/// never appear here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingTopic {
    Camera { camera_id: String },
    Sensor { sensor_id: String },
    External { scene_uid: String, category: String },
    Database,
}

pub fn parse_incoming(topic: &str) -> Option<IncomingTopic> {
    let parts: Vec<&str> = topic.split('/').collect();
    match parts.as_slice() {
        ["scenescape", "data", "camera", camera_id] => Some(IncomingTopic::Camera { camera_id: camera_id.to_string() }),
        ["scenescape", "data", "sensor", sensor_id] => Some(IncomingTopic::Sensor { sensor_id: sensor_id.to_string() }),
        ["scenescape", "data", "external", scene_uid, category] => {
            Some(IncomingTopic::External { scene_uid: scene_uid.to_string(), category: category.to_string() })
        }
        ["scenescape", "cmd", "database"] => Some(IncomingTopic::Database),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camera_and_external_topics() {
        assert_eq!(parse_incoming("scenescape/data/camera/cam1"), Some(IncomingTopic::Camera { camera_id: "cam1".into() }));
        assert_eq!(
            parse_incoming("scenescape/data/external/child-1/person"),
            Some(IncomingTopic::External { scene_uid: "child-1".into(), category: "person".into() })
        );
        assert_eq!(parse_incoming("scenescape/cmd/database"), Some(IncomingTopic::Database));
        assert_eq!(parse_incoming("garbage/topic"), None);
    }
}
