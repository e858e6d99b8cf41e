//! Data Source Adapter: the one seam that talks to whatever stores scene
//! configuration. Two variants, exactly as the teacher separates a `Camera`'s
//! calibration source from the thing that *uses* calibration (`mvg::Camera`
//! stays agnostic of where `RosOpenCvIntrinsics` came from) — here the boundary
//! is the network/filesystem split instead of calibration math.
//!
//! No retries live in this module: a transient failure is surfaced to the
//! caller (the Cache Manager), which treats it as a no-op refresh.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use scene_types::{Camera, ChildLink, Scene};

use crate::error::Result;

/// Per-category class taxonomy, as returned by `getAssets()`.
pub type AssetClasses = BTreeMap<String, Vec<String>>;

/// Sparse camera-parameter patch pushed by `updateCamera`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intrinsics: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distortion: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Resolution {
    pub width: f64,
    pub height: f64,
}

/// The five seams spec'd for any backing store (spec §4.1).
pub trait DataSource: Send + Sync {
    fn get_scenes(&self) -> Result<Vec<Scene>>;
    fn get_camera(&self, uid: &str) -> Result<Option<Camera>>;
    fn update_camera(&self, uid: &str, patch: &CameraPatch) -> Result<bool>;
    fn get_assets(&self) -> Result<AssetClasses>;
    fn get_child_scenes(&self, scene_uid: &str) -> Result<Vec<ChildLink>>;
    fn set_trs_matrix(&self, scene_uid: &str, matrix: [f64; 16]) -> Result<bool>;
}

#[derive(Debug, Deserialize)]
struct ResultsEnvelope<T> {
    #[serde(default)]
    results: Option<T>,
    #[serde(rename = "statusCode", default)]
    status_code: Option<u16>,
}

/// REST-backed adapter: bearer auth, optional root CA, no retry.
pub struct RestDataSource {
    base_url: String,
    bearer_token: String,
    client: reqwest::blocking::Client,
}

impl RestDataSource {
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>, root_cert_pem: Option<&[u8]>) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder().timeout(Duration::from_secs(10));
        if let Some(pem) = root_cert_pem {
            let cert = reqwest::Certificate::from_pem(pem)?;
            builder = builder.add_root_certificate(cert);
        }
        Ok(Self {
            base_url: base_url.into(),
            bearer_token: bearer_token.into(),
            client: builder.build()?,
        })
    }

    fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.bearer_token)
            .send()?;
        let envelope: ResultsEnvelope<T> = resp.json()?;
        Ok(envelope.results)
    }

    fn post_json(&self, path: &str, body: &impl Serialize) -> Result<bool> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.bearer_token)
            .json(body)
            .send()?;
        Ok(resp.status().is_success())
    }
}

impl DataSource for RestDataSource {
    fn get_scenes(&self) -> Result<Vec<Scene>> {
        Ok(self.get("/api/v1/scenes")?.unwrap_or_default())
    }

    fn get_camera(&self, uid: &str) -> Result<Option<Camera>> {
        self.get(&format!("/api/v1/cameras/{uid}"))
    }

    fn update_camera(&self, uid: &str, patch: &CameraPatch) -> Result<bool> {
        self.post_json(&format!("/api/v1/cameras/{uid}"), patch)
    }

    fn get_assets(&self) -> Result<AssetClasses> {
        Ok(self.get("/api/v1/assets")?.unwrap_or_default())
    }

    fn get_child_scenes(&self, scene_uid: &str) -> Result<Vec<ChildLink>> {
        Ok(self.get(&format!("/api/v1/scenes/{scene_uid}/children"))?.unwrap_or_default())
    }

    fn set_trs_matrix(&self, scene_uid: &str, matrix: [f64; 16]) -> Result<bool> {
        self.post_json(&format!("/api/v1/scenes/{scene_uid}/trs_xyz_to_lla"), &matrix.to_vec())
    }
}

/// Filesystem-backed adapter for local development and tests: reads every
/// `*.json` file in a directory once and caches the parsed scenes in memory.
pub struct FileDataSource {
    dir: PathBuf,
    cached: RwLock<Vec<Scene>>,
}

impl FileDataSource {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let cached = Self::read_dir(&dir)?;
        Ok(Self { dir, cached: RwLock::new(cached) })
    }

    fn read_dir(dir: &Path) -> Result<Vec<Scene>> {
        let mut scenes = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            scenes.push(serde_json::from_str(&raw)?);
        }
        Ok(scenes)
    }

    pub fn reload(&self) -> Result<()> {
        *self.cached.write() = Self::read_dir(&self.dir)?;
        Ok(())
    }
}

impl DataSource for FileDataSource {
    fn get_scenes(&self) -> Result<Vec<Scene>> {
        Ok(self.cached.read().clone())
    }

    fn get_camera(&self, uid: &str) -> Result<Option<Camera>> {
        Ok(self
            .cached
            .read()
            .iter()
            .find_map(|s| s.cameras.get(uid).cloned()))
    }

    fn update_camera(&self, _uid: &str, _patch: &CameraPatch) -> Result<bool> {
        // local/test variant: no persistent backing store to write through to.
        Ok(true)
    }

    fn get_assets(&self) -> Result<AssetClasses> {
        Ok(AssetClasses::default())
    }

    fn get_child_scenes(&self, scene_uid: &str) -> Result<Vec<ChildLink>> {
        Ok(self
            .cached
            .read()
            .iter()
            .find(|s| s.uid == scene_uid)
            .map(|s| s.children.values().cloned().collect())
            .unwrap_or_default())
    }

    fn set_trs_matrix(&self, _scene_uid: &str, _matrix: [f64; 16]) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_data_source_reads_directory() {
        let dir = tempdir();
        let mut f = std::fs::File::create(dir.join("a.json")).unwrap();
        write!(
            f,
            r#"{{"uid":"scene-1","name":"Test","map_file":"map.png","scale":1.0,
               "cameras":{{}},"sensors":{{}},"regions":{{}},"tripwires":{{}},"children":{{}},
               "camera_pose":null,"parent":null,"use_tracker":true,"output_lla":false,
               "map_corners_lla":null,"retrack":true,"regulated_rate":1.0,
               "external_update_rate":1.0,"persist_attributes":{{}},"tracker_config":null}}"#
        )
        .unwrap();
        let source = FileDataSource::new(&dir).unwrap();
        let scenes = source.get_scenes().unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].uid, "scene-1");
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scene-core-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
