//! Per-caller admission control for the proxy's API routes.
//!
//! Two interchangeable algorithms sit behind the [`RateLimiter`] facade:
//!
//! - **Fixed window** -- every caller gets `limit` requests per window; the
//!   counter resets when the window elapses. Rejected requests still count,
//!   so `used` keeps growing until the reset.
//!
//! - **Sliding window counter** -- blends the previous and current fixed
//!   windows for a smoother cap at a window boundary.
//!
//! Both use [`DashMap`](dashmap::DashMap) for concurrent access and include a
//! periodic cleanup to evict idle callers.

pub mod fixed_window;
pub mod sliding_window;

use std::sync::Arc;
use std::time::Duration;

use tubecache_common::{RateLimitAlgorithm, RateLimitConfig};

pub use fixed_window::FixedWindowLimiter;
pub use sliding_window::SlidingWindowLimiter;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests attributed to the caller in the current window, this one
    /// included.
    pub used: u64,
    pub limit: u64,
    /// Time until the caller's window resets.
    pub reset_after: Duration,
}

impl RateDecision {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    /// True exactly once per window: for the first request over the limit.
    pub fn is_first_rejection(&self) -> bool {
        !self.allowed && self.used == self.limit + 1
    }
}

/// A rate limiter delegating to one of the supported algorithms.
///
/// Cheaply cloneable (backed by `Arc`) and safe to share across tasks.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

enum RateLimiterInner {
    FixedWindow(FixedWindowLimiter),
    SlidingWindow(SlidingWindowLimiter),
}

impl RateLimiter {
    /// * `limit`  - requests allowed per window
    /// * `window` - window length
    pub fn new_fixed_window(limit: u64, window: Duration) -> Self {
        tracing::info!(limit, window_ms = window.as_millis() as u64, "creating fixed window rate limiter");
        Self {
            inner: Arc::new(RateLimiterInner::FixedWindow(FixedWindowLimiter::new(limit, window))),
        }
    }

    pub fn new_sliding_window(limit: u64, window: Duration) -> Self {
        tracing::info!(limit, window_ms = window.as_millis() as u64, "creating sliding window rate limiter");
        Self {
            inner: Arc::new(RateLimiterInner::SlidingWindow(SlidingWindowLimiter::new(limit, window))),
        }
    }

    /// Build the limiter described by `config`, or `None` when disabled.
    pub fn from_config(config: &RateLimitConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let window = Duration::from_millis(config.window_ms);
        Some(match config.algorithm {
            RateLimitAlgorithm::FixedWindow => Self::new_fixed_window(config.limit, window),
            RateLimitAlgorithm::SlidingWindow => Self::new_sliding_window(config.limit, window),
        })
    }

    /// Check whether a request from `key` is admitted.
    pub fn check(&self, key: &str) -> RateDecision {
        match self.inner.as_ref() {
            RateLimiterInner::FixedWindow(limiter) => limiter.check(key),
            RateLimiterInner::SlidingWindow(limiter) => limiter.check(key),
        }
    }

    pub fn limit(&self) -> u64 {
        match self.inner.as_ref() {
            RateLimiterInner::FixedWindow(limiter) => limiter.limit(),
            RateLimiterInner::SlidingWindow(limiter) => limiter.limit(),
        }
    }

    pub fn window(&self) -> Duration {
        match self.inner.as_ref() {
            RateLimiterInner::FixedWindow(limiter) => limiter.window(),
            RateLimiterInner::SlidingWindow(limiter) => limiter.window(),
        }
    }

    /// Spawn a background thread that periodically evicts idle callers.
    ///
    /// The thread holds an `Arc` to the inner limiter and runs for the rest
    /// of the process.
    pub fn start_cleanup_task(&self) {
        let inner = Arc::clone(&self.inner);
        let period = self.window().max(Duration::from_secs(60));

        std::thread::Builder::new()
            .name("rate-limit-cleanup".into())
            .spawn(move || loop {
                std::thread::sleep(period);

                match inner.as_ref() {
                    RateLimiterInner::FixedWindow(limiter) => limiter.cleanup(),
                    RateLimiterInner::SlidingWindow(limiter) => limiter.cleanup(),
                }

                tracing::trace!("rate limiter cleanup tick completed");
            })
            .map(|_| ())
            .unwrap_or_else(|e| tracing::error!(error = %e, "failed to spawn rate-limit cleanup thread"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_window_through_facade() {
        let limiter = RateLimiter::new_fixed_window(3, Duration::from_secs(60));

        assert!(limiter.check("client-a").allowed);
        assert!(limiter.check("client-a").allowed);
        let third = limiter.check("client-a");
        assert!(third.allowed);
        assert_eq!(third.remaining(), 0);

        let fourth = limiter.check("client-a");
        assert!(!fourth.allowed);
        assert!(fourth.is_first_rejection());
        assert!(!limiter.check("client-a").is_first_rejection());

        // Different key is independent.
        assert!(limiter.check("client-b").allowed);
    }

    #[test]
    fn sliding_window_through_facade() {
        let limiter = RateLimiter::new_sliding_window(5, Duration::from_secs(1));

        for i in 0..5 {
            assert!(limiter.check("client-x").allowed, "request {} should pass", i);
        }

        assert!(!limiter.check("client-x").allowed, "should deny beyond window limit");
    }

    #[test]
    fn clone_shares_state() {
        let limiter = RateLimiter::new_fixed_window(2, Duration::from_secs(60));
        let limiter2 = limiter.clone();

        assert!(limiter.check("shared").allowed);
        assert!(limiter2.check("shared").allowed);

        // Both clones counted against the same window.
        assert!(!limiter.check("shared").allowed);
        assert!(!limiter2.check("shared").allowed);
    }

    #[test]
    fn from_config_respects_enabled_flag() {
        let mut config = RateLimitConfig::default();
        let limiter = RateLimiter::from_config(&config).unwrap();
        assert_eq!(limiter.limit(), 152);
        assert_eq!(limiter.window(), Duration::from_secs(60));

        config.enabled = false;
        assert!(RateLimiter::from_config(&config).is_none());
    }
}
