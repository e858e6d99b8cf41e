//! Remote child-scene status bridge (spec §4.5.1): for every
//! `ChildLink::Remote`, maintain a second MQTT connection to the child's own
//! broker and forward its status topic onto the parent bus. Grounded on
//! `main.rs`'s own `MqttOptions`/`Client::new`/event-loop setup and on
//! `time_chunking.rs`'s `Weak`-upgrade thread lifecycle (the bridge thread
//! exits once its `Arc` handle is dropped, i.e. once the child link is no
//! longer present in a scene refresh).

use std::sync::{Arc, Weak};
use std::time::Duration;

use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use tracing::warn;

/// One live bridge to a remote child scene's broker. Dropping this (by
/// removing it from `Controller::child_links` on the next `update_subscriptions`)
/// is what tears the connection down.
pub struct ChildSceneController {
    uid: String,
}

impl ChildSceneController {
    /// Connects to the child's broker, subscribes to its status topic, and
    /// republishes every message it carries onto the parent bus under the
    /// same topic name, so parent-side subscribers never need to know a
    /// child scene lives behind a different broker.
    pub fn spawn(uid: String, broker_host: String, broker_port: u16, parent_client: Client) -> Arc<Self> {
        let bridge = Arc::new(Self { uid: uid.clone() });
        let weak: Weak<Self> = Arc::downgrade(&bridge);
        let status_topic = scene_types::topics::childscene_status(&uid);
        let client_id = format!("scene-controller-child-{uid}");

        std::thread::Builder::new()
            .name(format!("childscene-bridge-{uid}"))
            .spawn(move || {
                let mut options = MqttOptions::new(client_id, broker_host, broker_port);
                options.set_keep_alive(Duration::from_secs(60));
                let (child_client, mut connection) = Client::new(options, 16);
                if let Err(e) = child_client.subscribe(&status_topic, QoS::AtLeastOnce) {
                    warn!(child = %uid, error = %e, "failed to subscribe to remote child status topic");
                    return;
                }

                for notification in connection.iter() {
                    if weak.upgrade().is_none() {
                        break;
                    }
                    let event = match notification {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(child = %uid, error = %e, "remote child connection error");
                            continue;
                        }
                    };
                    let Event::Incoming(Packet::Publish(publish)) = event else { continue };
                    if let Err(e) = parent_client.publish(&status_topic, QoS::AtLeastOnce, false, publish.payload) {
                        warn!(child = %uid, error = %e, "failed to bridge child status onto the parent bus");
                    }
                }
            })
            .expect("spawn childscene bridge thread");

        bridge
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }
}
