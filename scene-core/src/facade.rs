//! Tracker Facade (spec §4.4): a category-partitioned front for
//! [`scene_tracking::TrackerWorker`]. Two admission strategies share one
//! shape, matching how the teacher's `tracking` crate keeps one
//! `MotionModel`/`ObservationModel` pair per category in `flydra2`'s model
//! pool rather than a single shared tracker instance.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use scene_tracking::{Tracker, TrackedObject, TrackerInput, TrackerWorker, WorkItem};

use crate::time_chunking::TimeChunkDispatcher;

pub type Category = String;

enum Mode {
    Direct,
    TimeChunked(Arc<TimeChunkDispatcher>),
}

/// Factory closure the facade uses to build a fresh tracker for a category it
/// has not seen before (spec §4.3.2: "switching facades... reconstructs the
/// tracker").
pub type TrackerFactory = Arc<dyn Fn(&str) -> Box<dyn Tracker> + Send + Sync>;

pub struct TrackerFacade {
    workers: RwLock<BTreeMap<Category, Arc<TrackerWorker>>>,
    factory: TrackerFactory,
    mode: Mode,
    classes: RwLock<Vec<String>>,
}

impl TrackerFacade {
    pub fn direct(factory: TrackerFactory) -> Arc<Self> {
        Arc::new(Self { workers: RwLock::new(BTreeMap::new()), factory, mode: Mode::Direct, classes: RwLock::new(Vec::new()) })
    }

    pub fn time_chunked(factory: TrackerFactory, interval_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            workers: RwLock::new(BTreeMap::new()),
            factory,
            mode: Mode::TimeChunked(TimeChunkDispatcher::spawn(interval_ms)),
            classes: RwLock::new(Vec::new()),
        })
    }

    pub fn is_time_chunked(&self) -> bool {
        matches!(self.mode, Mode::TimeChunked(_))
    }

    fn worker_for(self: &Arc<Self>, category: &str) -> Arc<TrackerWorker> {
        if let Some(worker) = self.workers.read().get(category) {
            return worker.clone();
        }
        let mut workers = self.workers.write();
        workers
            .entry(category.to_string())
            .or_insert_with(|| Arc::new(TrackerWorker::spawn(category, (self.factory)(category))))
            .clone()
    }

    /// spec §4.4 `createObject`: constructs a tracker input, no work admitted yet.
    pub fn create_object(&self, loc: nalgebra::Point3<f64>, camera_id: impl Into<String>, when: f64) -> TrackerInput {
        TrackerInput::new(loc, camera_id.into(), when)
    }

    /// spec §4.4 `trackObjects`: direct facades enqueue immediately; time-chunked
    /// facades buffer by `(category, cameraID)` for the next dispatch tick.
    pub fn track_objects(
        self: &Arc<Self>,
        category: &str,
        camera_id: &str,
        new: Vec<TrackerInput>,
        already_tracked: Vec<TrackedObject>,
        when: f64,
    ) -> bool {
        let worker = self.worker_for(category);
        match &self.mode {
            Mode::Direct => worker.submit(WorkItem { new, already_tracked, when }),
            Mode::TimeChunked(dispatcher) => {
                dispatcher.add_message(category.to_string(), camera_id.to_string(), worker, WorkItem { new, already_tracked, when });
                true
            }
        }
    }

    pub fn current_objects(self: &Arc<Self>, category: &str) -> Vec<TrackedObject> {
        self.worker_for(category).current_objects()
    }

    pub fn unique_id_count(self: &Arc<Self>, category: &str) -> usize {
        self.worker_for(category).unique_id_count()
    }

    /// spec §4.4 `updateObjectClasses`: refreshes the taxonomy builders use to
    /// construct each object's classification vector.
    pub fn update_object_classes(&self, classes: Vec<String>) {
        *self.classes.write() = classes;
    }

    pub fn classes(&self) -> Vec<String> {
        self.classes.read().clone()
    }
}
