//! Minimal counters for the handful of rates and drop reasons the spec calls
//! out by name (§2, §4.4, §4.5.2): messages processed, objects tracked, and
//! `dropped{reason, category}`. The teacher instruments `flydra2` with
//! `tracing` spans rather than a metrics crate of its own, so this follows the
//! same shape — plain atomics plus `tracing` events, no external metrics
//! dependency.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use parking_lot::RwLock;

#[derive(Default)]
pub struct Metrics {
    messages_processed: AtomicU64,
    objects_tracked: AtomicU64,
    dropped: RwLock<BTreeMap<(String, String), u64>>,
}

impl Metrics {
    pub fn global() -> &'static Metrics {
        static INSTANCE: OnceLock<Metrics> = OnceLock::new();
        INSTANCE.get_or_init(Metrics::default)
    }

    pub fn inc_messages_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    pub fn set_objects_tracked(&self, n: u64) {
        self.objects_tracked.store(n, Ordering::Relaxed);
    }

    pub fn objects_tracked(&self) -> u64 {
        self.objects_tracked.load(Ordering::Relaxed)
    }

    /// `dropped{reason="tracker_busy"|"fell_behind", category}` (spec §4.4, §4.5.2).
    pub fn inc_dropped(&self, reason: &str, category: &str) {
        let key = (reason.to_string(), category.to_string());
        let mut dropped = self.dropped.write();
        *dropped.entry(key).or_insert(0) += 1;
        tracing::debug!(reason, category, "dropped");
    }

    pub fn dropped_count(&self, reason: &str, category: &str) -> u64 {
        self.dropped.read().get(&(reason.to_string(), category.to_string())).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_counters_are_keyed_by_reason_and_category() {
        let metrics = Metrics::default();
        metrics.inc_dropped("tracker_busy", "person");
        metrics.inc_dropped("tracker_busy", "person");
        metrics.inc_dropped("fell_behind", "person");
        assert_eq!(metrics.dropped_count("tracker_busy", "person"), 2);
        assert_eq!(metrics.dropped_count("fell_behind", "person"), 1);
        assert_eq!(metrics.dropped_count("tracker_busy", "vehicle"), 0);
    }
}
