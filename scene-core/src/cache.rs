//! Cache Manager: the four indexes kept in sync with the last successful
//! refresh (spec §4.2), grounded on `cache_manager.py`'s `CacheManager` and
//! shaped like `flydra2::connected_camera_manager`'s
//! `Arc<RwLock<...>>`-per-entity handle pattern so a lookup caller can hold a
//! scene across a tick without holding the cache's own lock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, warn};

use scene_types::{CameraId, Scene, SensorId, Uid};

use crate::adapter::{CameraPatch, DataSource, Resolution};
use crate::error::Result;

#[derive(Debug, Clone, Default)]
struct CachedCameraParams {
    intrinsics: Option<serde_json::Value>,
    distortion: Option<serde_json::Value>,
}

/// Config for the optional TTL-driven background refresh (spec §9 Open
/// Question 1; resolved in DESIGN.md as default-off, opt-in).
#[derive(Debug, Clone, Copy)]
pub struct CacheManagerConfig {
    pub ttl_refresh: Option<Duration>,
}

impl Default for CacheManagerConfig {
    fn default() -> Self {
        Self { ttl_refresh: None }
    }
}

pub struct CacheManager {
    data_source: Arc<dyn DataSource>,
    config: CacheManagerConfig,

    by_uid: RwLock<BTreeMap<Uid, Arc<RwLock<Scene>>>>,
    by_camera_id: RwLock<BTreeMap<CameraId, Arc<RwLock<Scene>>>>,
    by_sensor_id: RwLock<BTreeMap<SensorId, Arc<RwLock<Scene>>>>,
    by_remote_child_id: RwLock<BTreeMap<Uid, [f64; 16]>>,

    camera_parameters: RwLock<BTreeMap<CameraId, CachedCameraParams>>,
    last_refreshed: RwLock<Option<Instant>>,
    valid: RwLock<bool>,
}

impl CacheManager {
    pub fn new(data_source: Arc<dyn DataSource>, config: CacheManagerConfig) -> Result<Self> {
        let manager = Self {
            data_source,
            config,
            by_uid: RwLock::new(BTreeMap::new()),
            by_camera_id: RwLock::new(BTreeMap::new()),
            by_sensor_id: RwLock::new(BTreeMap::new()),
            by_remote_child_id: RwLock::new(BTreeMap::new()),
            camera_parameters: RwLock::new(BTreeMap::new()),
            last_refreshed: RwLock::new(None),
            valid: RwLock::new(false),
        };
        manager.refresh_scenes()?;
        Ok(manager)
    }

    /// spec §4.2 `refreshScenes`: full re-fetch, camera-parameter
    /// reconciliation, and index rebuild. A failed fetch (no `results`) leaves
    /// the existing cache untouched — "the caller treats missing `results` as
    /// a no-op refresh" (spec §4.1).
    pub fn refresh_scenes(&self) -> Result<()> {
        let fetched = match self.data_source.get_scenes() {
            Ok(scenes) => scenes,
            Err(e) => {
                warn!(error = %e, "refreshScenes: adapter fetch failed, keeping stale cache");
                return Ok(());
            }
        };

        let mut by_uid = self.by_uid.write();
        let mut by_camera_id = self.by_camera_id.write();
        let mut by_sensor_id = self.by_sensor_id.write();

        let incoming_uids: std::collections::BTreeSet<_> = fetched.iter().map(|s| s.uid.clone()).collect();
        by_uid.retain(|uid, _| incoming_uids.contains(uid));
        by_camera_id.clear();
        by_sensor_id.clear();

        for mut scene_data in fetched {
            self.reconcile_cameras(&mut scene_data);
            scene_data.recompute_trs_xyz_to_lla();

            let handle = by_uid
                .entry(scene_data.uid.clone())
                .and_modify(|existing| {
                    existing.write().merge_from(scene_data.clone());
                })
                .or_insert_with(|| Arc::new(RwLock::new(scene_data.clone())))
                .clone();

            for camera_id in scene_data.cameras.keys() {
                by_camera_id.insert(camera_id.clone(), handle.clone());
            }
            for sensor_id in scene_data.sensors.keys() {
                by_sensor_id.insert(sensor_id.clone(), handle.clone());
            }
        }

        *self.last_refreshed.write() = Some(Instant::now());
        *self.valid.write() = true;
        Ok(())
    }

    /// spec §4.2 camera-parameter reconciliation: only `k1,k2,p1,p2,k3` are
    /// compared, a `cx,cy` change also derives and pushes `resolution`.
    fn reconcile_cameras(&self, scene_data: &mut Scene) {
        for camera in scene_data.cameras.values() {
            let mut params = self.camera_parameters.write();
            let Some(cached) = params.get(&camera.camera_id).cloned() else { continue };

            let mut patch = CameraPatch::default();
            if let Some(distortion) = &cached.distortion {
                patch.distortion = Some(distortion.clone());
            }
            if let Some(intrinsics) = &cached.intrinsics {
                if let (Some(cx), Some(cy)) = (
                    intrinsics.get("cx").and_then(|v| v.as_f64()),
                    intrinsics.get("cy").and_then(|v| v.as_f64()),
                ) {
                    patch.resolution = Some(Resolution { width: cx * 2.0, height: cy * 2.0 });
                }
                patch.intrinsics = Some(intrinsics.clone());
            }
            drop(params);

            if patch.intrinsics.is_some() || patch.distortion.is_some() {
                match self.data_source.update_camera(&camera.camera_id, &patch) {
                    Ok(true) => {
                        if let Err(e) = self.data_source.get_camera(&camera.camera_id) {
                            warn!(camera = %camera.camera_id, error = %e, "re-read after updateCamera failed");
                        }
                    }
                    Ok(false) => warn!(camera = %camera.camera_id, "updateCamera reported failure"),
                    Err(e) => warn!(camera = %camera.camera_id, error = %e, "updateCamera failed"),
                }
            }
        }
    }

    /// spec §4.2 `refreshScenesForCamParams`: stash changed params, push them
    /// through the adapter, then trigger a full refresh if anything changed.
    pub fn refresh_for_cam_params(&self, camera_id: &str, intrinsics: Option<serde_json::Value>, distortion: Option<serde_json::Value>) -> Result<()> {
        let mut changed = false;
        {
            let mut params = self.camera_parameters.write();
            let entry = params.entry(camera_id.to_string()).or_default();
            if intrinsics.is_some() && intrinsics != entry.intrinsics {
                entry.intrinsics = intrinsics;
                changed = true;
            }
            if distortion.is_some() && distortion != entry.distortion {
                entry.distortion = distortion;
                changed = true;
            }
        }
        if changed {
            debug!(camera = camera_id, "camera parameters changed, refreshing");
            self.refresh_scenes()?;
        }
        Ok(())
    }

    /// spec §4.2 `invalidate`: forces the next lookup to refresh.
    pub fn invalidate(&self) {
        *self.valid.write() = false;
    }

    fn check_refresh(&self) {
        let stale = !*self.valid.read()
            || self.last_refreshed.read().is_none()
            || self
                .config
                .ttl_refresh
                .is_some_and(|ttl| self.last_refreshed.read().is_some_and(|t| t.elapsed() > ttl));
        if stale {
            if let Err(e) = self.refresh_scenes() {
                warn!(error = %e, "checkRefresh: refreshScenes failed");
            }
        }
    }

    /// Owned snapshot of every cached scene handle (spec §9 Open Question 2:
    /// resolved as a `Vec` snapshot rather than a live iterator so callers
    /// never observe half of a concurrent refresh).
    pub fn all_scenes(&self) -> Vec<Arc<RwLock<Scene>>> {
        self.check_refresh();
        self.by_uid.read().values().cloned().collect()
    }

    pub fn scene_with_id(&self, uid: &str) -> Option<Arc<RwLock<Scene>>> {
        self.check_refresh();
        self.by_uid.read().get(uid).cloned()
    }

    pub fn scene_with_camera_id(&self, camera_id: &str) -> Option<Arc<RwLock<Scene>>> {
        self.check_refresh();
        self.by_camera_id.read().get(camera_id).cloned()
    }

    pub fn scene_with_sensor_id(&self, sensor_id: &str) -> Option<Arc<RwLock<Scene>>> {
        self.check_refresh();
        self.by_sensor_id.read().get(sensor_id).cloned()
    }

    pub fn scene_with_remote_child_id(&self, child_id: &str) -> Option<[f64; 16]> {
        self.check_refresh();
        self.by_remote_child_id.read().get(child_id).copied()
    }

    pub fn set_remote_child_transform(&self, child_id: impl Into<Uid>, transform: [f64; 16]) {
        self.by_remote_child_id.write().insert(child_id.into(), transform);
    }
}
