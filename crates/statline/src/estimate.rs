use std::time::{Duration, Instant};

use indicatif::{HumanBytes, HumanDuration};

/// Position gain of the alpha-beta filter.
const ALPHA: f64 = 0.5;
/// Velocity gain of the alpha-beta filter.
const BETA: f64 = 0.1;
/// Floor for the elapsed time fed to a filter step. Same-instant or
/// out-of-order polls are clamped here instead of being dropped, so the
/// displayed throughput keeps converging under very fast polling while the
/// velocity gain `BETA / dt` stays bounded.
const MIN_STEP: Duration = Duration::from_millis(100);

/// Alpha-beta filter smoothing noisy incremental byte counts into a
/// display-stable throughput and ETA.
///
/// Byte totals accumulate through [`add`](Self::add); the filter itself only
/// advances when the display asks for a formatted string, so the smoothing
/// cadence follows the render cadence.
#[derive(Debug, Clone)]
pub struct RateEstimator {
    complete: u64,
    total: u64,
    position: f64,
    velocity: f64,
    /// Latest sample timestamp; advanced by `add`, never rewinds.
    last_observation: Instant,
    /// Last filter step; advanced by `observe`.
    last_update: Instant,
}

impl RateEstimator {
    pub fn new(at: Instant) -> Self {
        Self {
            complete: 0,
            total: 0,
            position: 0.0,
            velocity: 0.0,
            last_observation: at,
            last_update: at,
        }
    }

    /// Accumulate a progress delta observed at `at`.
    ///
    /// Out-of-order samples are accepted but never rewind the observation
    /// clock.
    pub fn add(&mut self, at: Instant, completed: i64, total: i64) {
        self.complete = self.complete.saturating_add_signed(completed);
        self.total = self.total.saturating_add_signed(total);
        if at > self.last_observation {
            self.last_observation = at;
        }
    }

    pub fn complete(&self) -> u64 {
        self.complete
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Completed percentage of the accumulated totals. 0 when nothing was
    /// ever promised.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.complete as f64 / self.total as f64 * 100.0).min(100.0)
        }
    }

    /// Percentage-only form used when the status line runs out of room.
    pub fn short(&self) -> String {
        format!("{:.1}%", self.percent())
    }

    /// Run one filter step for the time elapsed up to `now`.
    fn observe(&mut self, now: Instant) {
        let dt = now
            .saturating_duration_since(self.last_update)
            .max(MIN_STEP)
            .as_secs_f64();
        self.position += self.velocity * dt;
        let residual = self.complete as f64 - self.position;
        self.position += ALPHA * residual;
        self.velocity += BETA / dt * residual;
        if now > self.last_update {
            self.last_update = now;
        }
    }

    /// Human progress string: completed/total bytes, percentage, smoothed
    /// throughput and, while bytes remain, an ETA.
    ///
    /// Empty while no bytes were ever promised; `(cached)` once a total is
    /// known but zero bytes have moved (an instantaneous or skipped
    /// transfer, not an infinite ETA).
    pub fn format(&mut self, now: Instant) -> String {
        if self.total == 0 && self.complete == 0 {
            return String::new();
        }
        if self.complete == 0 {
            return "(cached)".to_string();
        }
        self.observe(now);

        let mut out = format!(
            "{}/{} {:.1}%",
            HumanBytes(self.complete),
            HumanBytes(self.total),
            self.percent()
        );
        if self.velocity > 0.0 {
            out.push_str(&format!(" {}/s", HumanBytes(self.velocity as u64)));
            if self.total > self.complete {
                let remaining = (self.total - self.complete) as f64 / self.velocity;
                out.push_str(&format!(
                    " eta {}",
                    HumanDuration(Duration::from_secs_f64(remaining))
                ));
            }
        }
        out
    }

    /// Completion summary: `<size> in <duration> (<rate>/s)`, or `(cached)`
    /// when the tracker existed but zero bytes were ever reported.
    pub fn summary(&self, elapsed: Duration) -> String {
        if self.complete == 0 {
            return "(cached)".to_string();
        }
        let rate = self.complete as f64 / elapsed.max(MIN_STEP).as_secs_f64();
        format!(
            "{} in {} ({}/s)",
            HumanBytes(self.complete),
            HumanDuration(elapsed),
            HumanBytes(rate as u64)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> Instant {
        Instant::now()
    }

    #[test]
    fn test_deltas_accumulate_and_saturate() {
        let start = t0();
        let mut est = RateEstimator::new(start);
        est.add(start, 4, 100);
        est.add(start, 50, 0);
        est.add(start, 46, 0);
        assert_eq!(est.complete(), 100);
        assert_eq!(est.total(), 100);

        est.add(start, -200, 0);
        assert_eq!(est.complete(), 0, "negative deltas saturate at zero");
    }

    #[test]
    fn test_percent_monotonic_to_one_hundred() {
        let start = t0();
        let mut est = RateEstimator::new(start);
        est.add(start, 0, 1000);

        let mut last = est.percent();
        for step in 1..=10 {
            est.add(start + Duration::from_millis(step * 10), 100, 0);
            let pct = est.percent();
            assert!(pct >= last, "percentage must be non-decreasing");
            last = pct;
        }
        assert_eq!(last, 100.0);
        assert_eq!(est.short(), "100.0%");
    }

    #[test]
    fn test_format_empty_until_first_delta() {
        let start = t0();
        let mut est = RateEstimator::new(start);
        assert_eq!(est.format(start), "");
    }

    #[test]
    fn test_zero_bytes_with_total_reports_cached() {
        let start = t0();
        let mut est = RateEstimator::new(start);
        est.add(start, 0, 4096);
        assert_eq!(est.format(start + Duration::from_secs(1)), "(cached)");
        assert_eq!(est.summary(Duration::from_secs(1)), "(cached)");
    }

    #[test]
    fn test_same_instant_update_is_clamped_not_dropped() {
        let start = t0();
        let mut est = RateEstimator::new(start);
        est.add(start, 50, 100);
        // Two formats at the very same instant: the second must still see a
        // positive filter step (the clamp), not a frozen state.
        let first = est.format(start);
        est.add(start, 25, 0);
        let second = est.format(start);
        assert!(first.contains("50.0%"), "got {first:?}");
        assert!(second.contains("75.0%"), "got {second:?}");
        assert!(est.velocity > 0.0);
    }

    #[test]
    fn test_out_of_order_sample_does_not_rewind_clock() {
        let start = t0();
        let later = start + Duration::from_secs(2);
        let mut est = RateEstimator::new(start);
        est.add(later, 10, 100);
        est.add(start, 10, 0);
        assert_eq!(est.last_observation, later);
        assert_eq!(est.complete(), 20);
    }

    #[test]
    fn test_steady_rate_converges() {
        let start = t0();
        let mut est = RateEstimator::new(start);
        est.add(start, 0, 10_000);
        // 1000 bytes per second, sampled and rendered once a second.
        for sec in 1..=8u64 {
            let now = start + Duration::from_secs(sec);
            est.add(now, 1000, 0);
            est.format(now);
        }
        assert!(
            (est.velocity - 1000.0).abs() < 250.0,
            "velocity should settle near 1000 B/s, got {}",
            est.velocity
        );
    }

    #[test]
    fn test_summary_reports_size_and_rate() {
        let start = t0();
        let mut est = RateEstimator::new(start);
        est.add(start, 100, 100);
        let summary = est.summary(Duration::from_secs(2));
        assert!(summary.contains("100 B"), "summary was {summary:?}");
        assert!(summary.contains("/s"));
    }
}
