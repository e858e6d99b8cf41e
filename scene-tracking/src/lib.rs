#![deny(rust_2018_idioms)]

//! The `Tracker` trait, the bundled constant-velocity implementation, the
//! `TrackedObject` type it produces, and the worker-thread wrapper the
//! Tracker Facade (in `scene-core`) builds on.

pub mod object;
pub mod tracker;
pub mod worker;

pub use object::{ChainData, RegionEntry, TrackedObject};
pub use tracker::{ConstantVelocityTracker, Tracker, TrackerInput};
pub use worker::{TrackerWorker, WorkItem};
