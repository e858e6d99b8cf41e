//! Scene-controller bus loop binary (spec §4.5), grounded on
//! `scene_controller.py`'s `SceneController.__init__` / `loopForever` and
//! `braid-offline-retrack.rs`'s CLI/logging conventions.

mod childscene;
mod controller;
mod error;
mod handlers;
mod ntp;
mod publish;
mod rate;
mod subscriptions;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rumqttc::{Event, MqttOptions, Packet};
use scene_core::{CacheManager, CacheManagerConfig, DataSource, FileDataSource, RestDataSource};

use controller::{Controller, ControllerConfig};
use ntp::SystemOffsetSource;
use subscriptions::IncomingTopic;

#[derive(Parser, Debug)]
#[command(author, version, about = "Scene-controller: bus-facing tracking and event runtime")]
struct Cli {
    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    broker_host: String,
    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    broker_port: u16,
    /// MQTT username, if the broker requires one
    #[arg(long)]
    mqtt_user: Option<String>,
    /// MQTT password, if the broker requires one
    #[arg(long)]
    mqtt_password: Option<String>,

    /// REST base URL for the scene data source (mutually exclusive with `--data-dir`)
    #[arg(long)]
    rest_url: Option<String>,
    /// Bearer token for the REST data source
    #[arg(long, default_value = "")]
    rest_token: String,
    /// Directory of scene JSON files for the filesystem data source
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,

    /// Tracker config JSON file (spec §6); controls time-chunking defaults
    #[arg(long)]
    tracker_config: Option<std::path::PathBuf>,

    /// Treat every inbound message as the current wall-clock time
    #[arg(long)]
    rewrite_all_time: bool,
    /// Rewrite `msg_when` to now instead of dropping on excessive lag
    #[arg(long)]
    rewrite_bad_time: bool,
    /// Maximum tolerated gap, in seconds, between receipt and claimed timestamp
    #[arg(long, default_value_t = 5.0)]
    max_lag: f64,
    /// "regulated" or "unregulated": whether per-camera pixel bounds attach
    /// to the regulated stream or the per-category stream
    #[arg(long, default_value = "unregulated")]
    visibility_topic: String,
}

fn main() -> anyhow::Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "scene_controller=info,scene_core=info,warn");
    }
    let _tracing_guard = env_tracing_logger::init();
    let cli = Cli::parse();

    let data_source: Arc<dyn DataSource> = match (&cli.rest_url, &cli.data_dir) {
        (Some(url), None) => Arc::new(RestDataSource::new(url.clone(), cli.rest_token.clone(), None).context("building REST data source")?),
        (None, Some(dir)) => Arc::new(FileDataSource::new(dir).context("building filesystem data source")?),
        (None, None) => anyhow::bail!("one of --rest-url or --data-dir is required"),
        (Some(_), Some(_)) => anyhow::bail!("--rest-url and --data-dir are mutually exclusive"),
    };

    if let Some(path) = &cli.tracker_config {
        let config = scene_config::load_tracker_config(path).context("loading tracker config file")?;
        tracing::info!(time_chunking_enabled = config.time_chunking_enabled, interval_ms = config.time_chunking_interval_milliseconds, "loaded tracker config");
    }

    let cache = Arc::new(CacheManager::new(data_source.clone(), CacheManagerConfig::default()).context("initial scene cache fetch")?);

    let mut mqtt_options = MqttOptions::new("scene-controller", cli.broker_host.clone(), cli.broker_port);
    mqtt_options.set_keep_alive(Duration::from_secs(60));
    if let (Some(user), Some(password)) = (&cli.mqtt_user, &cli.mqtt_password) {
        mqtt_options.set_credentials(user.clone(), password.clone());
    }
    let (client, mut connection) = rumqttc::Client::new(mqtt_options, 64);

    let controller = Controller::new(
        client,
        cache,
        data_source,
        Arc::new(SystemOffsetSource),
        ControllerConfig {
            rewrite_bad_time: cli.rewrite_bad_time,
            rewrite_all_time: cli.rewrite_all_time,
            max_lag: cli.max_lag,
            visibility_topic: cli.visibility_topic,
        },
    );

    controller.refresh_all().context("initial subscription/cache refresh")?;
    tracing::info!(broker = %cli.broker_host, port = cli.broker_port, "connected, entering bus loop");

    for notification in connection.iter() {
        let event = match notification {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "mqtt connection error");
                continue;
            }
        };
        let Event::Incoming(Packet::Publish(publish)) = event else { continue };

        let Some(topic) = subscriptions::parse_incoming(&publish.topic) else {
            tracing::debug!(topic = %publish.topic, "unroutable topic");
            continue;
        };

        if let Err(e) = dispatch(&controller, &topic, &publish.payload[..]) {
            tracing::warn!(topic = %publish.topic, error = %e, "handler failed");
        }
    }

    Ok(())
}

fn dispatch(controller: &Controller, topic: &IncomingTopic, payload: &[u8]) -> error::Result<()> {
    match topic {
        IncomingTopic::Database => {
            controller.refresh_all()?;
        }
        IncomingTopic::Sensor { .. } => {
            let raw: serde_json::Value = serde_json::from_slice(payload)?;
            handlers::handle_sensor_message(controller, &raw)?;
        }
        IncomingTopic::Camera { .. } | IncomingTopic::External { .. } => {
            let raw: serde_json::Value = serde_json::from_slice(payload)?;
            match handlers::handle_moving_object_message(controller, topic, &raw) {
                Ok(Some(ingest)) => publish::publish_camera_ingest(controller, &ingest)?,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "moving object ingest failed, invalidating cache");
                    controller.cache.invalidate();
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_core::adapter::{AssetClasses, CameraPatch, DataSource};
    use scene_core::{CacheManager, CacheManagerConfig};

    struct EmptySource;

    impl DataSource for EmptySource {
        fn get_scenes(&self) -> scene_core::Result<Vec<scene_types::Scene>> {
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
        let cache = Arc::new(CacheManager::new(source.clone(), CacheManagerConfig::default()).unwrap());
        let (client, _connection) = rumqttc::Client::new(MqttOptions::new("test", "localhost", 1883), 64);
        Controller::new(
            client,
            cache,
            source,
            Arc::new(SystemOffsetSource),
            ControllerConfig { rewrite_bad_time: false, rewrite_all_time: false, max_lag: 5.0, visibility_topic: "unregulated".into() },
        )
    }

    #[test]
    fn database_topic_refreshes_without_error_on_an_empty_cache() {
        let controller = test_controller();
        dispatch(&controller, &IncomingTopic::Database, b"{}").unwrap();
    }

    #[test]
    fn malformed_sensor_payload_surfaces_as_an_error() {
        let controller = test_controller();
        let topic = IncomingTopic::Sensor { sensor_id: "sensor1".into() };
        assert!(dispatch(&controller, &topic, b"not json").is_err());
    }

    #[test]
    fn camera_message_for_an_unknown_camera_is_a_no_op() {
        let controller = test_controller();
        let topic = IncomingTopic::Camera { camera_id: "cam-nope".into() };
        let payload = serde_json::json!({
            "id": "cam-nope",
            "timestamp": chrono::Utc::now(),
            "objects": {},
        });
        dispatch(&controller, &topic, &serde_json::to_vec(&payload).unwrap()).unwrap();
    }
}
