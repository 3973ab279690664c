//! Upstream quota accounting.
//!
//! The upstream charges a fixed number of quota units per call depending on
//! the resource. [`QuotaLedger`] keeps process-lifetime totals of what was
//! spent on forwarded calls and what the cache saved, plus plain counters for
//! vanity URL resolutions.

pub mod costs;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

pub use costs::{quota_cost, QUOTA_COSTS};

/// Counters for `/v3/` list calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListStats {
    pub api_calls: u64,
    pub api_quota_used: u64,
    pub cached_calls: u64,
    pub cache_quota_saved: u64,
}

/// Counters for `/v1/resolve_url` calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolveStats {
    pub resolved: u64,
    pub resolve_cached: u64,
}

/// Point-in-time copy of the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub v3: ListStats,
    pub v1: ResolveStats,
}

/// Shared quota ledger. All counters sit behind one lock so a snapshot is
/// always internally consistent.
#[derive(Default)]
pub struct QuotaLedger {
    stats: Mutex<QuotaSnapshot>,
}

impl QuotaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one list call.
    ///
    /// Operations missing from the cost table are logged and otherwise
    /// ignored; accounting never fails a request.
    pub fn record(&self, operation: &str, was_cache_hit: bool) {
        let Some(cost) = quota_cost(operation) else {
            tracing::warn!(operation, "unsupported operation, quota not recorded");
            return;
        };

        let mut stats = self.stats.lock().expect("quota ledger lock poisoned");
        if was_cache_hit {
            stats.v3.cached_calls += 1;
            stats.v3.cache_quota_saved += cost;
        } else {
            stats.v3.api_calls += 1;
            stats.v3.api_quota_used += cost;
        }
    }

    /// Count one vanity URL resolution.
    pub fn record_resolution(&self, was_cache_hit: bool) {
        let mut stats = self.stats.lock().expect("quota ledger lock poisoned");
        if was_cache_hit {
            stats.v1.resolve_cached += 1;
        } else {
            stats.v1.resolved += 1;
        }
    }

    pub fn snapshot(&self) -> QuotaSnapshot {
        *self.stats.lock().expect("quota ledger lock poisoned")
    }

    /// Spawn a Tokio task that logs the ledger snapshot every `interval`.
    pub fn spawn_reporter(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let ledger = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it so the first
            // report covers a full interval.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let snapshot = ledger.snapshot();
                match serde_json::to_string(&snapshot) {
                    Ok(stats) => tracing::info!(stats = %stats, "quota stats"),
                    Err(e) => tracing::error!(error = %e, "failed to serialize quota stats"),
                }
            }
        })
    }
}
