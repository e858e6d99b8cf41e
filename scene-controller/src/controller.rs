//! The bus-facing controller: owns the MQTT client, the cache manager, the
//! per-scene tracker runtime registry, and the output bookkeeping the Python
//! original keeps as dynamic attributes on its `Scene` object. Grounded on
//! `scene_controller.py`'s `SceneController` class.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rumqttc::Client;
use scene_core::adapter::DataSource;
use scene_core::{CacheManager, SceneRuntime, TrackerFacade, TrackerFactory};
use scene_tracking::{ConstantVelocityTracker, Tracker};
use scene_types::{ChildLink, Uid};
use tracing::warn;

use crate::childscene::ChildSceneController;
use crate::error::Result;
use crate::ntp::NtpOffsetSource;
use crate::rate::RateTracker;
use crate::subscriptions::{Route, Subscription, SubscriptionSet};

/// Controller-local regulated-fan-out cache (spec §4.5.3 `regulate_cache`):
/// the most recent per-category detection payload across all cameras, plus
/// the per-camera instantaneous rate.
#[derive(Default)]
pub(crate) struct RegulateEntry {
    pub(crate) objects: BTreeMap<String, Vec<serde_json::Value>>,
    pub(crate) rate: BTreeMap<String, f64>,
    pub(crate) last: Option<f64>,
}

/// Per-scene output bookkeeping (`lastPubCount`, `last_published_detection`,
/// the regulate-cache entry) kept controller-side since `scene_types::Scene`
/// is the cache's plain config/wire type, not a place for publish-loop state.
#[derive(Default)]
pub(crate) struct SceneOutputState {
    pub(crate) last_pub_count: BTreeMap<String, usize>,
    pub(crate) last_external_pub: BTreeMap<String, f64>,
    pub(crate) regulate: RegulateEntry,
}

pub struct ControllerConfig {
    pub rewrite_bad_time: bool,
    pub rewrite_all_time: bool,
    pub max_lag: f64,
    /// "regulated" or "unregulated" (spec §4.6): whether per-camera pixel
    /// bounds are attached to the regulated stream or the per-category stream.
    pub visibility_topic: String,
}

pub struct Controller {
    pub(crate) client: Client,
    pub(crate) subscriptions: Mutex<SubscriptionSet>,
    pub(crate) cache: Arc<CacheManager>,
    pub(crate) data_source: Arc<dyn DataSource>,
    pub(crate) ntp: Arc<dyn NtpOffsetSource>,
    pub(crate) config: ControllerConfig,
    pub(crate) runtimes: RwLock<BTreeMap<Uid, Arc<SceneRuntime>>>,
    pub(crate) output_state: Mutex<BTreeMap<Uid, SceneOutputState>>,
    pub(crate) regulate_rate: Mutex<RateTracker>,
    pub(crate) child_links: Mutex<BTreeMap<Uid, Arc<ChildSceneController>>>,
}

impl Controller {
    pub fn new(
        client: Client,
        cache: Arc<CacheManager>,
        data_source: Arc<dyn DataSource>,
        ntp: Arc<dyn NtpOffsetSource>,
        config: ControllerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            subscriptions: Mutex::new(SubscriptionSet::default()),
            cache,
            data_source,
            ntp,
            config,
            runtimes: RwLock::new(BTreeMap::new()),
            output_state: Mutex::new(BTreeMap::new()),
            regulate_rate: Mutex::new(RateTracker::default()),
            child_links: Mutex::new(BTreeMap::new()),
        })
    }

    /// Lazily builds (or returns) the tracker runtime bound to `handle`,
    /// constructing a direct or time-chunked facade per the scene's own
    /// tracker config (spec §4.3.2: "switching facades reconstructs the
    /// tracker" — the facade is built once per scene and kept for its life).
    pub(crate) fn runtime_for(&self, handle: Arc<RwLock<scene_types::Scene>>) -> Arc<SceneRuntime> {
        let uid = handle.read().uid.clone();
        if let Some(existing) = self.runtimes.read().get(&uid) {
            return existing.clone();
        }
        let mut runtimes = self.runtimes.write();
        runtimes
            .entry(uid)
            .or_insert_with(|| {
                let (time_chunking, interval_ms) = match &handle.read().tracker_config {
                    Some(cfg) => (cfg.time_chunking_enabled, cfg.time_chunking_interval_milliseconds),
                    None => (false, scene_config::DEFAULT_CHUNKING_INTERVAL_MS),
                };
                let factory: TrackerFactory = Arc::new(|category: &str| Box::new(ConstantVelocityTracker::new(category)) as Box<dyn Tracker>);
                let facade = if time_chunking { TrackerFacade::time_chunked(factory, interval_ms) } else { TrackerFacade::direct(factory) };
                SceneRuntime::new(handle, facade)
            })
            .clone()
    }

    /// spec §4.5.1: rebuild subscriptions from the current cache contents.
    /// Called on connect and on every `scenescape/cmd/database` "update".
    pub fn update_subscriptions(&self) -> Result<()> {
        self.cache.invalidate();
        let scenes = self.cache.all_scenes();

        let mut desired = BTreeSet::new();
        desired.insert(Subscription { topic: scene_types::topics::CMD_DATABASE.to_string(), route: Route::Database });
        let mut desired_remote: BTreeMap<Uid, (String, u16)> = BTreeMap::new();

        for scene in &scenes {
            let scene = scene.read();
            for camera_id in scene.cameras.keys() {
                desired.insert(Subscription { topic: scene_types::topics::camera_data(camera_id), route: Route::Camera });
            }
            for sensor_id in scene.sensors.keys() {
                desired.insert(Subscription { topic: scene_types::topics::sensor_data(sensor_id), route: Route::Sensor });
            }
            for child in scene.children.values() {
                match child {
                    ChildLink::Local { uid } => {
                        desired.insert(Subscription { topic: scene_types::topics::external_data_wildcard(uid), route: Route::ExternalWildcard });
                    }
                    ChildLink::Remote { uid, broker_host, broker_port } => {
                        desired_remote.insert(uid.clone(), (broker_host.clone(), *broker_port));
                    }
                }
            }
        }

        self.subscriptions.lock().reconcile(&self.client, desired)?;
        self.reconcile_remote_children(desired_remote);
        Ok(())
    }

    /// spec §4.5.1: spawn a [`ChildSceneController`] bridge for every remote
    /// child not already connected, and drop (disconnecting) any whose link
    /// disappeared from this refresh.
    fn reconcile_remote_children(&self, desired: BTreeMap<Uid, (String, u16)>) {
        let mut child_links = self.child_links.lock();
        child_links.retain(|uid, _| desired.contains_key(uid));
        for (uid, (broker_host, broker_port)) in desired {
            child_links.entry(uid.clone()).or_insert_with(|| ChildSceneController::spawn(uid, broker_host, broker_port, self.client.clone()));
        }
    }

    /// spec §4.5.1 `updateObjectClasses`: refreshes every scene's tracker
    /// taxonomy from the adapter's asset list. The bundled facade keeps one
    /// flat class list rather than per-category lists (spec §4.4), so the
    /// per-category results from `getAssets` are flattened before applying.
    pub fn update_object_classes(&self) -> Result<()> {
        let assets = self.data_source.get_assets()?;
        let classes: Vec<String> = assets.into_values().flatten().collect();
        for runtime in self.runtimes.read().values() {
            runtime.facade.update_object_classes(classes.clone());
        }
        Ok(())
    }

    /// spec §4.5.1 `updateTRSMatrix`: push every geodetic-ready scene's
    /// derived transform back to the data source.
    pub fn update_trs_matrix(&self) -> Result<()> {
        for scene in self.cache.all_scenes() {
            let (uid, matrix) = {
                let scene = scene.read();
                (scene.uid.clone(), scene.trs_xyz_to_lla)
            };
            let Some(matrix) = matrix else { continue };
            let flat = matrix_to_row_major(&matrix);
            match self.data_source.set_trs_matrix(&uid, flat) {
                Ok(true) => {}
                Ok(false) => warn!(scene = %uid, "data source rejected trs matrix update"),
                Err(e) => warn!(scene = %uid, error = %e, "failed to push trs matrix"),
            }
        }
        Ok(())
    }

    /// spec §4.5.1 `updateRegulateCache`: drop regulate-cache entries for
    /// scenes and cameras that no longer exist.
    pub fn prune_regulate_cache(&self) {
        let live_uids: BTreeSet<Uid> = self.cache.all_scenes().iter().map(|s| s.read().uid.clone()).collect();
        let mut state = self.output_state.lock();
        state.retain(|uid, _| live_uids.contains(uid));
        for (uid, entry) in state.iter_mut() {
            let Some(scene) = self.cache.scene_with_id(uid) else { continue };
            let live_cameras: BTreeSet<String> = scene.read().cameras.keys().cloned().collect();
            entry.regulate.rate.retain(|camera_id, _| live_cameras.contains(camera_id));
        }
    }

    /// spec §4.5.1 on-connect and on-database-update sequence.
    pub fn refresh_all(&self) -> Result<()> {
        self.update_subscriptions()?;
        self.update_object_classes()?;
        self.update_trs_matrix()?;
        self.prune_regulate_cache();
        Ok(())
    }
}

fn matrix_to_row_major(m: &nalgebra::Matrix4<f64>) -> [f64; 16] {
    let mut out = [0.0; 16];
    for row in 0..4 {
        for col in 0..4 {
            out[row * 4 + col] = m[(row, col)];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_remote_children_spawns_and_drops_bridges() {
        let (client, _connection) = rumqttc::Client::new(rumqttc::MqttOptions::new("test", "localhost", 1883), 16);
        let controller = Controller::new(
            client,
            Arc::new(CacheManager::new(Arc::new(scene_core::FileDataSource::new(std::env::temp_dir()).unwrap()), Default::default()).unwrap()),
            Arc::new(scene_core::FileDataSource::new(std::env::temp_dir()).unwrap()),
            Arc::new(crate::ntp::SystemOffsetSource),
            ControllerConfig { rewrite_bad_time: false, rewrite_all_time: false, max_lag: 5.0, visibility_topic: "unregulated".into() },
        );

        let mut desired = BTreeMap::new();
        desired.insert("child1".to_string(), ("localhost".to_string(), 1u16));
        controller.reconcile_remote_children(desired);
        assert_eq!(controller.child_links.lock().len(), 1);

        controller.reconcile_remote_children(BTreeMap::new());
        assert!(controller.child_links.lock().is_empty());
    }

    #[test]
    fn row_major_flattening_matches_matrix_indexing() {
        let m = nalgebra::Matrix4::new(
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0,
        );
        assert_eq!(matrix_to_row_major(&m), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
    }
}
