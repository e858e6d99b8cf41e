//! Exponential moving-average rate tracking (spec §4.5.3 `calculateRate`):
//! `rate <- (rate*N + dt)/(N+1)`, grounded directly on `scene_controller.py`'s
//! `calculateRate`.

pub const AVG_FRAMES: f64 = 100.0;

#[derive(Debug, Clone, Copy)]
pub struct RateTracker {
    last: Option<f64>,
    rate: f64,
}

impl Default for RateTracker {
    fn default() -> Self {
        Self { last: None, rate: 1.0 }
    }
}

impl RateTracker {
    /// Folds in one more tick at wall-clock `now` and returns the updated
    /// average period in seconds.
    pub fn tick(&mut self, now: f64) -> f64 {
        if let Some(last) = self.last {
            let delta = now - last;
            self.rate = (self.rate * AVG_FRAMES + delta) / (AVG_FRAMES + 1.0);
        }
        self.last = Some(now);
        self.rate
    }

    pub fn hz(&self) -> f64 {
        if self.rate > 0.0 {
            1.0 / self.rate
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_towards_a_steady_tick_period() {
        let mut tracker = RateTracker::default();
        let mut now = 0.0;
        for _ in 0..500 {
            now += 0.1;
            tracker.tick(now);
        }
        approx::assert_relative_eq!(tracker.hz(), 10.0, epsilon = 0.5);
    }
}
