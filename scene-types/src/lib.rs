#![deny(rust_2018_idioms)]

//! Wire message shapes, scene configuration data model, and bus topic helpers.

pub mod error;
pub mod messages;
pub mod model;
pub mod topics;

pub use error::{Result, TypesError};
pub use messages::{
    Detection, DetectorMessage, EventOutput, ExitedObject, Location, RegulatedOutput,
    SingletonSensorMessage,
};
pub use model::{
    Camera, CameraId, Category, ChildLink, RefreshStamp, Region, Scene, Sensor, SensorId,
    TrackerConfig, Tripwire, Uid,
};
