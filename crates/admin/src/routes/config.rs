use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::state::SharedState;

/// GET /api/config
///
/// Credentials are marked `skip_serializing` and never appear here.
pub async fn get_config(State(state): State<SharedState>) -> Response {
    match serde_json::to_value(&state.config) {
        Ok(config) => Json(config).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "config serialization failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
