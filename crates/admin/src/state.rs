use std::sync::Arc;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};
use tubecache_cache::CacheStore;
use tubecache_common::AppConfig;
use tubecache_quota::QuotaLedger;

/// Shared state type alias used across all route handlers.
pub type SharedState = Arc<AppState>;

/// Process-wide state shared by the public proxy and the admin API.
pub struct AppState {
    pub config: AppConfig,
    pub cache: Arc<CacheStore>,
    pub ledger: Arc<QuotaLedger>,
    pub metrics: ProxyMetrics,
    pub start_time: std::time::Instant,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Prometheus metrics collected by the proxy.
pub struct ProxyMetrics {
    pub registry: Registry,
    pub requests_total: IntCounterVec,
    pub rejected_total: IntCounterVec,
    pub request_duration: HistogramVec,
    pub cache_entries: IntGauge,
    pub quota_api_calls: IntGauge,
    pub quota_units_used: IntGauge,
    pub quota_cached_calls: IntGauge,
    pub quota_units_saved: IntGauge,
    pub resolved: IntGauge,
    pub resolve_cached: IntGauge,
}

fn gauge(name: &str, help: &str) -> IntGauge {
    IntGauge::with_opts(Opts::new(name, help)).expect("failed to create gauge")
}

impl ProxyMetrics {
    /// Create all counters, gauges and histograms registered against a
    /// fresh Prometheus registry.
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("tubecache_requests_total", "Total API requests by route"),
            &["route"],
        )
        .expect("failed to create requests_total counter");

        let rejected_total = IntCounterVec::new(
            Opts::new("tubecache_rejected_total", "Requests answered with a proxy error, by reason"),
            &["reason"],
        )
        .expect("failed to create rejected_total counter");

        let request_duration = HistogramVec::new(
            HistogramOpts::new("tubecache_request_duration_seconds", "Request handling duration in seconds")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0]),
            &["route"],
        )
        .expect("failed to create request_duration histogram");

        let cache_entries = gauge("tubecache_cache_entries", "Entries currently held by the response cache");
        let quota_api_calls = gauge("tubecache_quota_api_calls", "List calls forwarded upstream");
        let quota_units_used = gauge("tubecache_quota_units_used", "Quota units spent on forwarded calls");
        let quota_cached_calls = gauge("tubecache_quota_cached_calls", "List calls served from cache");
        let quota_units_saved = gauge("tubecache_quota_units_saved", "Quota units saved by the cache");
        let resolved = gauge("tubecache_resolved", "Vanity URLs resolved upstream");
        let resolve_cached = gauge("tubecache_resolve_cached", "Vanity URLs resolved from cache");

        registry.register(Box::new(requests_total.clone())).expect("failed to register requests_total");
        registry.register(Box::new(rejected_total.clone())).expect("failed to register rejected_total");
        registry.register(Box::new(request_duration.clone())).expect("failed to register request_duration");
        for g in [
            &cache_entries,
            &quota_api_calls,
            &quota_units_used,
            &quota_cached_calls,
            &quota_units_saved,
            &resolved,
            &resolve_cached,
        ] {
            registry.register(Box::new(g.clone())).expect("failed to register gauge");
        }

        Self {
            registry,
            requests_total,
            rejected_total,
            request_duration,
            cache_entries,
            quota_api_calls,
            quota_units_used,
            quota_cached_calls,
            quota_units_saved,
            resolved,
            resolve_cached,
        }
    }
}

impl Default for ProxyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new(config: AppConfig, cache: Arc<CacheStore>, ledger: Arc<QuotaLedger>) -> Self {
        Self {
            config,
            cache,
            ledger,
            metrics: ProxyMetrics::new(),
            start_time: std::time::Instant::now(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Copy ledger and cache figures into their gauges before a scrape.
    pub fn refresh_gauges(&self) {
        let snapshot = self.ledger.snapshot();
        let m = &self.metrics;
        m.cache_entries.set(self.cache.len() as i64);
        m.quota_api_calls.set(snapshot.v3.api_calls as i64);
        m.quota_units_used.set(snapshot.v3.api_quota_used as i64);
        m.quota_cached_calls.set(snapshot.v3.cached_calls as i64);
        m.quota_units_saved.set(snapshot.v3.cache_quota_saved as i64);
        m.resolved.set(snapshot.v1.resolved as i64);
        m.resolve_cached.set(snapshot.v1.resolve_cached as i64);
    }
}
