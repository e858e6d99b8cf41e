#![deny(rust_2018_idioms)]

//! Scene-controller runtime core: the scene-config cache, the Tracker Facade,
//! detection/event builders, and the per-scene ingest pipeline that
//! `scene-controller`'s bus handlers drive. Grounded on
//! `examples/original_source/controller/src/controller/{cache_manager,
//! time_chunking,scene,scene_controller}.py`.

pub mod adapter;
pub mod builders;
pub mod cache;
pub mod error;
pub mod facade;
pub mod metrics;
pub mod scene;
pub mod time;
pub mod time_chunking;

pub use adapter::{AssetClasses, CameraPatch, DataSource, FileDataSource, Resolution, RestDataSource};
pub use builders::{attach_primary_camera_bounds, build_detections_dict, build_detections_list, compute_camera_bounds, pixel_box_to_meter_plane};
pub use cache::{CacheManager, CacheManagerConfig};
pub use error::{CoreError, Result};
pub use facade::{Category, TrackerFacade, TrackerFactory};
pub use metrics::Metrics;
pub use scene::{RegionEvent, SceneEvents, SceneRuntime, TripwireEvent, DEBOUNCE_DELAY};
pub use time::{datetime_to_epoch, epoch_to_datetime};
pub use time_chunking::TimeChunkDispatcher;
