use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::SharedState;

/// GET /api/stats
///
/// Returns the quota ledger snapshot alongside cache occupancy and uptime.
pub async fn get_stats(State(state): State<SharedState>) -> Json<Value> {
    let snapshot = state.ledger.snapshot();

    Json(json!({
        "quota": snapshot,
        "cache_entries": state.cache.len(),
        "cache_ttl_secs": state.cache.ttl().as_secs(),
        "started_at": state.started_at.to_rfc3339(),
        "uptime_secs": state.start_time.elapsed().as_secs()
    }))
}
