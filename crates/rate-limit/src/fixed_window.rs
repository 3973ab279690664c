use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::RateDecision;

struct WindowState {
    count: u64,
    window_start: Instant,
}

/// A concurrent fixed window counter.
///
/// Each key gets `limit` requests per `window`, starting from its first
/// request. Every call is counted, admitted or not.
pub struct FixedWindowLimiter {
    windows: DashMap<String, WindowState>,
    window: Duration,
    limit: u64,
}

impl FixedWindowLimiter {
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

        let mut entry = self.windows.entry(key.to_string()).or_insert_with(|| WindowState {
            count: 0,
            window_start: now,
        });
        let state = entry.value_mut();

        if now.duration_since(state.window_start) >= self.window {
            state.count = 0;
            state.window_start = now;
        }

        state.count += 1;
        let elapsed = now.duration_since(state.window_start);

        RateDecision {
            allowed: state.count <= self.limit,
            used: state.count,
            limit: self.limit,
            reset_after: self.window.saturating_sub(elapsed),
        }
    }

    /// Remove keys whose window has already elapsed.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_key, state| now.duration_since(state.window_start) < self.window);

        tracing::debug!(remaining = self.windows.len(), "fixed window cleanup complete");
    }
}
