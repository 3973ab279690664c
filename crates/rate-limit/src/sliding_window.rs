use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::RateDecision;

/// Internal state for a single sliding window counter entry.
struct SlidingWindowState {
    current_count: u64,
    previous_count: u64,
    /// Rejections since `window_start`.
    rejected: u64,
    window_start: Instant,
}

/// A concurrent sliding window counter rate limiter.
///
/// Approximates a true sliding window by weighting the previous fixed
/// window's count by how much of it still overlaps the sliding one. Only
/// admitted requests feed the estimate; rejections are tallied separately
/// so each one reports a distinct `used`.
pub struct SlidingWindowLimiter {
    windows: DashMap<String, SlidingWindowState>,
    window: Duration,
    limit: u64,
}

impl SlidingWindowLimiter {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            limit,
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();

        let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| SlidingWindowState {
            current_count: 0,
            previous_count: 0,
            rejected: 0,
            window_start: now,
        });
        let state = entry.value_mut();

        // Rotate as many windows as have fully elapsed. Two or more idle
        // windows leave nothing to carry over.
        let mut rotations = 0;
        while now.duration_since(state.window_start) >= self.window {
            state.previous_count = if rotations == 0 { state.current_count } else { 0 };
            state.current_count = 0;
            state.rejected = 0;
            state.window_start += self.window;
            rotations += 1;
        }

        let elapsed_in_window = now.duration_since(state.window_start);
        let elapsed_fraction =
            (elapsed_in_window.as_secs_f64() / self.window.as_secs_f64()).min(1.0);

        let weighted_count =
            (state.previous_count as f64) * (1.0 - elapsed_fraction) + (state.current_count as f64);

        let allowed = weighted_count < self.limit as f64;
        let used = if allowed {
            state.current_count += 1;
            weighted_count.floor() as u64 + 1
        } else {
            state.rejected += 1;
            self.limit + state.rejected
        };

        RateDecision {
            allowed,
            used,
            limit: self.limit,
            reset_after: self.window.saturating_sub(elapsed_in_window),
        }
    }

    /// Remove entries whose window started more than two windows ago.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let stale_threshold = self.window * 2;

        self.windows
            .retain(|_key, state| now.duration_since(state.window_start) < stale_threshold);

        tracing::debug!(remaining = self.windows.len(), "sliding window cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn allows_up_to_limit() {
        let limiter = SlidingWindowLimiter::new(10, Duration::from_secs(1));
        let key = "test-client";

        for i in 0..10 {
            assert!(limiter.check(key).allowed, "request {} should be allowed", i);
        }

        let denied = limiter.check(key);
        assert!(!denied.allowed, "should deny beyond limit");
        assert_eq!(denied.used, 11);
    }

    #[test]
    fn window_rotation_decays_previous_count() {
        let limiter = SlidingWindowLimiter::new(5, Duration::from_secs(1));
        let key = "rotate-client";

        for _ in 0..5 {
            limiter.check(key);
        }
        assert!(!limiter.check(key).allowed);

        // Past the boundary the previous window's weight is close to zero.
        thread::sleep(Duration::from_millis(1100));

        assert!(limiter.check(key).allowed, "should allow after window rotation");
    }

    #[test]
    fn one_first_rejection_per_window() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.check("c").allowed);
        }

        let rejections: Vec<_> = (0..5).map(|_| limiter.check("c")).collect();
        assert!(rejections.iter().all(|d| !d.allowed));
        assert_eq!(rejections.iter().filter(|d| d.is_first_rejection()).count(), 1);
        assert!(rejections[0].is_first_rejection());
        assert_eq!(rejections[4].used, 8);
        assert_eq!(rejections[4].remaining(), 0);
    }

    #[test]
    fn rejection_tally_resets_with_the_window() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_millis(100));
        assert!(limiter.check("c").allowed);
        assert!(limiter.check("c").is_first_rejection());
        assert!(!limiter.check("c").is_first_rejection());

        // Two full windows later nothing carries over.
        thread::sleep(Duration::from_millis(220));
        assert!(limiter.check("c").allowed);
        assert!(limiter.check("c").is_first_rejection());
    }

    #[test]
    fn independent_keys() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(1));

        assert!(limiter.check("a").allowed);
        assert!(limiter.check("a").allowed);
        assert!(!limiter.check("a").allowed);

        assert!(limiter.check("b").allowed);
    }

    #[test]
    fn cleanup_removes_stale_entries() {
        let limiter = SlidingWindowLimiter::new(10, Duration::from_secs(1));
        limiter.check("keep-alive");
        limiter.check("will-be-stale");

        {
            let mut entry = limiter.windows.get_mut("will-be-stale").unwrap();
            entry.window_start = Instant::now() - Duration::from_secs(10);
        }

        limiter.cleanup();

        assert!(limiter.windows.contains_key("keep-alive"));
        assert!(!limiter.windows.contains_key("will-be-stale"));
    }
}
