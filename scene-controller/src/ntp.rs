//! NTP offset collaborator (spec §4.8, §1 Non-goals: "NTP time correction...
//! no NTP client is implemented"). Grounded on `scene_controller.py`'s
//! `adjust_time`/`ntp_client` usage: the controller asks a collaborator for a
//! wall-clock correction and adds it to every `now` it computes, but does not
//! itself speak the NTP wire protocol.

use std::sync::atomic::{AtomicU64, Ordering};

/// Seconds to add to local wall-clock time to approximate bus/broker time.
pub trait NtpOffsetSource: Send + Sync {
    fn current_offset(&self) -> f64;
}

/// The default collaborator: no correction. Appropriate for tests and for
/// deployments where the host's own NTP daemon already keeps the controller
/// and the broker in sync (spec §4.8).
#[derive(Debug, Default)]
pub struct SystemOffsetSource;

impl NtpOffsetSource for SystemOffsetSource {
    fn current_offset(&self) -> f64 {
        0.0
    }
}

/// A fixed, externally-supplied offset, bits-stored so it can be updated from
/// another thread without a lock. Useful for tests that want to simulate
/// clock skew without a real NTP round trip.
#[derive(Debug, Default)]
pub struct FixedOffsetSource {
    bits: AtomicU64,
}

impl FixedOffsetSource {
    pub fn new(offset_seconds: f64) -> Self {
        Self { bits: AtomicU64::new(offset_seconds.to_bits()) }
    }

    pub fn set(&self, offset_seconds: f64) {
        self.bits.store(offset_seconds.to_bits(), Ordering::Relaxed);
    }
}

impl NtpOffsetSource for FixedOffsetSource {
    fn current_offset(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_source_applies_no_correction() {
        assert_eq!(SystemOffsetSource.current_offset(), 0.0);
    }

    #[test]
    fn fixed_source_can_be_updated_across_threads() {
        let source = std::sync::Arc::new(FixedOffsetSource::new(1.5));
        let other = source.clone();
        std::thread::spawn(move || other.set(2.5)).join().unwrap();
        assert_eq!(source.current_offset(), 2.5);
    }
}
