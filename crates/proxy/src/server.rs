use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, RawQuery, Request, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, warn};
use tubecache_admin::SharedStateType as SharedState;
use tubecache_common::{ProxyError, ProxyResult};
use tubecache_rate_limit::{RateDecision, RateLimiter};

use crate::context::CallerAddress;
use crate::dispatcher::{Dispatcher, UNKNOWN_CALLER};
use crate::query::QueryParams;
use crate::upstream::{JsonResponse, Upstream};
use crate::vanity::VanityResolver;

pub const RATE_LIMIT_MESSAGE: &str = "Exceeded usage limit, try again in a few minutes";

/// Everything a request handler needs.
pub struct ProxyState {
    pub dispatcher: Dispatcher,
    pub resolver: VanityResolver,
    pub limiter: Option<RateLimiter>,
    pub shared: SharedState,
    pub trust_proxy: bool,
}

pub type SharedProxyState = Arc<ProxyState>;

impl ProxyState {
    /// Wire the pipeline around the process-wide cache, ledger and config.
    pub fn new(shared: SharedState, upstream: Arc<dyn Upstream>) -> ProxyResult<Self> {
        let config = &shared.config;
        let dispatcher = Dispatcher::new(
            config,
            Arc::clone(&shared.cache),
            Arc::clone(&shared.ledger),
            Arc::clone(&upstream),
        )?;
        let resolver = VanityResolver::new(
            config,
            Arc::clone(&shared.cache),
            Arc::clone(&shared.ledger),
            upstream,
        )?;
        let limiter = RateLimiter::from_config(&config.rate_limit);
        let trust_proxy = config.server.trust_proxy;

        Ok(Self {
            dispatcher,
            resolver,
            limiter,
            shared,
            trust_proxy,
        })
    }
}

/// Build the public router: the two API routes behind the rate limit gate,
/// static files for everything else, CORS around it all.
pub fn build_router(state: SharedProxyState) -> Router {
    let static_dir = state.shared.config.server.static_dir.clone();
    let cors = cors_layer(&state.shared.config.server.cors_whitelist);

    let router = Router::new()
        .route("/v1/resolve_url", get(resolve_url))
        .route("/v3/{*path}", get(list_resource))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), rate_limit))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state);

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(whitelist: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = whitelist
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS]),
    )
}

/// GET /v1/resolve_url?url=...
async fn resolve_url(State(state): State<SharedProxyState>, RawQuery(query): RawQuery) -> Response {
    let started = Instant::now();
    let params = QueryParams::parse(query.as_deref().unwrap_or_default());
    let url = params.get("url").unwrap_or_default();

    let result = state.resolver.resolve(&url).await;
    finish(&state, "v1", started, result)
}

/// GET /v3/{resource}?...
async fn list_resource(
    State(state): State<SharedProxyState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    CallerAddress(caller): CallerAddress,
) -> Response {
    let started = Instant::now();
    let params = QueryParams::parse(query.as_deref().unwrap_or_default());

    let result = state
        .dispatcher
        .handle_list(&path, &params, caller.as_deref())
        .await;
    finish(&state, "v3", started, result)
}

fn finish(state: &ProxyState, route: &str, started: Instant, result: ProxyResult<JsonResponse>) -> Response {
    let metrics = &state.shared.metrics;
    metrics.requests_total.with_label_values(&[route]).inc();
    metrics
        .request_duration
        .with_label_values(&[route])
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(response.body)).into_response()
        }
        Err(e) => error_response(state, route, e),
    }
}

fn error_response(state: &ProxyState, route: &str, err: ProxyError) -> Response {
    let status = err.status_code();
    let reason = match &err {
        ProxyError::BadRequest(_) => "bad_request",
        ProxyError::Forbidden(_) => "forbidden",
        _ => "internal",
    };
    if status.is_server_error() {
        error!(route, error = %err, "request failed");
    }
    state.shared.metrics.rejected_total.with_label_values(&[reason]).inc();

    (status, Json(json!({ "message": err.public_message() }))).into_response()
}

/// Admission gate in front of the API routes.
async fn rate_limit(
    State(state): State<SharedProxyState>,
    CallerAddress(caller): CallerAddress,
    request: Request,
    next: Next,
) -> Response {
    let Some(ref limiter) = state.limiter else {
        return next.run(request).await;
    };

    let key = caller.as_deref().unwrap_or(UNKNOWN_CALLER);
    let decision = limiter.check(key);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        if decision.is_first_rejection() {
            warn!(caller = key, "rate-limited");
        }
        state
            .shared
            .metrics
            .rejected_total
            .with_label_values(&["rate_limited"])
            .inc();
        let mut response = (StatusCode::TOO_MANY_REQUESTS, RATE_LIMIT_MESSAGE).into_response();
        if let Ok(value) = HeaderValue::from_str(&reset_secs(&decision).to_string()) {
            response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
        }
        response
    };

    insert_rate_limit_headers(&mut response, limiter, &decision);
    response
}

fn reset_secs(decision: &RateDecision) -> u64 {
    let reset = decision.reset_after;
    reset.as_secs() + u64::from(reset.subsec_nanos() > 0)
}

/// IETF draft-8 `RateLimit-Policy` / `RateLimit` headers.
fn insert_rate_limit_headers(response: &mut Response, limiter: &RateLimiter, decision: &RateDecision) {
    let policy = format!(
        "\"default\";q={};w={}",
        limiter.limit(),
        limiter.window().as_secs().max(1)
    );
    let current = format!(
        "\"default\";r={};t={}",
        decision.remaining(),
        reset_secs(decision)
    );

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&policy) {
        headers.insert(HeaderName::from_static("ratelimit-policy"), value);
    }
    if let Ok(value) = HeaderValue::from_str(&current) {
        headers.insert(HeaderName::from_static("ratelimit"), value);
    }
}
