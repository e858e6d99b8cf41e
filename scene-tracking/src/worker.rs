//! The worker-thread wrapper around one [`Tracker`]: a bounded, monitored
//! input queue and a dedicated thread draining it (spec §4.4, §5). Uses
//! `crossbeam-channel` directly (the same channel crate `channellib` wraps for
//! `flydra2`'s own worker queues) because admission here must be genuinely
//! non-blocking (`try_send`), which `channellib::Sender::send` does not expose.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::TrySendError;
use parking_lot::RwLock;

use crate::object::TrackedObject;
use crate::tracker::{Tracker, TrackerInput};

/// One tick's admitted work: new detections plus already-tracked objects
/// bypassing re-association (spec §4.3.4).
pub struct WorkItem {
    pub new: Vec<TrackerInput>,
    pub already_tracked: Vec<TrackedObject>,
    pub when: f64,
}

/// Owns a `Tracker` on a dedicated thread behind a queue of capacity 1: a
/// worker is "busy" exactly when that single slot is occupied, matching spec
/// §4.4's "queue is non-empty" busy gate for the time-chunked facade.
pub struct TrackerWorker {
    sender: crossbeam_channel::Sender<WorkItem>,
    current: Arc<RwLock<Vec<TrackedObject>>>,
    unique_count: Arc<AtomicUsize>,
    _handle: JoinHandle<()>,
}

impl TrackerWorker {
    pub fn spawn(category: &str, mut tracker: Box<dyn Tracker>) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded::<WorkItem>(1);
        let current = Arc::new(RwLock::new(Vec::new()));
        let unique_count = Arc::new(AtomicUsize::new(0));
        let current_for_thread = current.clone();
        let unique_count_for_thread = unique_count.clone();
        let handle = std::thread::Builder::new()
            .name(format!("tracker-{category}"))
            .spawn(move || {
                while let Ok(item) = receiver.recv() {
                    tracker.track_objects(item.new, item.already_tracked, item.when);
                    *current_for_thread.write() = tracker.current_objects();
                    unique_count_for_thread.store(tracker.unique_id_count(), Ordering::Relaxed);
                }
            })
            .expect("spawn tracker worker thread");
        Self { sender, current, unique_count, _handle: handle }
    }

    /// The busy gate used by the time-chunked facade (spec §4.4): the single
    /// queue slot is still occupied, i.e. the worker has not finished the
    /// previous tick yet.
    pub fn is_busy(&self) -> bool {
        self.sender.is_full()
    }

    /// Admits one tick of work. Drops it (and logs) if the queue is already
    /// full, matching the "enqueue never blocks the handler" contract of spec §5.
    pub fn submit(&self, item: WorkItem) -> bool {
        match self.sender.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("tracker worker busy, dropping tick");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("tracker worker thread gone, dropping tick");
                false
            }
        }
    }

    pub fn current_objects(&self) -> Vec<TrackedObject> {
        self.current.read().clone()
    }

    pub fn unique_id_count(&self) -> usize {
        self.unique_count.load(Ordering::Relaxed)
    }
}
