pub mod routes;
pub mod state;

use std::future::Future;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tubecache_cache::CacheStore;
use tubecache_common::AppConfig;
use tubecache_quota::QuotaLedger;

use crate::state::SharedState;

pub use state::{AppState, ProxyMetrics, SharedState as SharedStateType};

/// Build the Axum router with all admin API routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Health check
        .route("/api/health", get(routes::health::health_check))
        // Prometheus metrics
        .route("/api/metrics", get(routes::metrics::get_metrics))
        // Running configuration
        .route("/api/config", get(routes::config::get_config))
        // Quota and cache statistics
        .route("/api/stats", get(routes::stats::get_stats))
        .with_state(state)
}

/// Start the admin API server on the specified address.
///
/// Runs until `shutdown` resolves.
pub async fn run_admin_server<F>(state: SharedState, listen_addr: &str, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("admin API server listening on {}", listen_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    Ok(())
}

/// Convenience function to create a SharedState from its parts.
pub fn new_shared_state(
    config: AppConfig,
    cache: Arc<CacheStore>,
    ledger: Arc<QuotaLedger>,
) -> SharedState {
    Arc::new(AppState::new(config, cache, ledger))
}
