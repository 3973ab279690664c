use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};
use tubecache_cache::CacheStore;
use tubecache_common::AppConfig;
use tubecache_proxy::{build_router, HttpUpstream, ProxyState, Upstream};
use tubecache_quota::QuotaLedger;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    // Parse command-line args for config path
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/tubecache.yaml".to_string());

    info!(config_path = %config_path, "starting tubecache");

    // File (if present), then environment overrides, then validation
    let config = AppConfig::load_with_env(&config_path)?;
    info!(
        listen = ?config.server.listen,
        allowed_paths = ?config.allowed.paths,
        cache_ttl_secs = config.cache.ttl_secs,
        "configuration loaded"
    );

    // Process-wide cache and ledger
    let cache = Arc::new(CacheStore::new(Duration::from_secs(config.cache.ttl_secs)));
    cache.start_sweep_task(Duration::from_secs(config.cache.check_period_secs));

    let ledger = Arc::new(QuotaLedger::new());
    ledger.spawn_reporter(Duration::from_secs(config.quota.report_interval_secs));

    let shared = tubecache_admin::new_shared_state(config.clone(), cache, ledger);

    let upstream: Arc<dyn Upstream> =
        Arc::new(HttpUpstream::new(Duration::from_secs(config.upstream.timeout_secs))?);
    let state = Arc::new(ProxyState::new(Arc::clone(&shared), upstream)?);
    if let Some(ref limiter) = state.limiter {
        limiter.start_cleanup_task();
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut servers = JoinSet::new();

    for listen_addr in &config.server.listen {
        let listener = tokio::net::TcpListener::bind(listen_addr).await?;
        info!(addr = %listen_addr, "listening");

        let app = build_router(Arc::clone(&state));
        let shutdown = wait_for_shutdown(shutdown_rx.clone());
        servers.spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(shutdown)
                .await
        });
    }

    if config.admin.enabled {
        let admin_listen = config.admin.listen.clone();
        let admin_state = Arc::clone(&shared);
        let shutdown = wait_for_shutdown(shutdown_rx.clone());
        tokio::spawn(async move {
            if let Err(e) = tubecache_admin::run_admin_server(admin_state, &admin_listen, shutdown).await {
                error!(error = %e, "admin API server error");
            }
        });
    }

    info!("tubecache started successfully");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        Some(result) = servers.join_next() => {
            // A listener only returns early on failure.
            match result {
                Ok(Err(e)) => error!(error = %e, "server error"),
                Err(e) => error!(error = %e, "server task failed"),
                Ok(Ok(())) => {}
            }
        }
    }

    let _ = shutdown_tx.send(true);
    while servers.join_next().await.is_some() {}

    info!("tubecache stopped");
    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
