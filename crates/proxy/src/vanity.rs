//! Vanity channel URL resolution.
//!
//! Human-readable channel references (`@handle`, `/user/name`, `/c/name`)
//! are resolved to a channel id through the upstream `resolve_url`
//! endpoint. Results are cached under the raw URL string.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use tubecache_cache::CacheStore;
use tubecache_common::{AppConfig, ProxyError, ProxyResult};
use tubecache_quota::QuotaLedger;
use url::Url;

use crate::query::resolve_cache_key;
use crate::upstream::{JsonResponse, Upstream};

/// Built-in URL shapes, tried in order. The last one is a catch-all that
/// accepts nearly any non-empty reference.
pub const DEFAULT_VANITY_PATTERNS: &[&str] = &[
    // @handle
    r"(?:https?://)?(?:\w+\.)?youtube\.com/@([^/?]+)(?:\?.*)?",
    // legacy username
    r"(?:https?://)?(?:\w+\.)?youtube\.com/user/([\w_-]+)(?:\?.*)?",
    // custom name
    r"(?:https?://)?(?:\w+\.)?youtube\.com/c/([^/?]+)(?:\?.*)?",
    r"(?:https?://)?(?:\w+\.)?(?:youtube\.com/)?([^/?]+)(?:\?.*)?",
];

/// Client identity sent with every resolution call.
const CLIENT_NAME: &str = "ANDROID";
const CLIENT_VERSION: &str = "19.09.37";
const CLIENT_LANGUAGE: &str = "en";

static DEFAULT_PATTERNS: Lazy<VanityPatterns> = Lazy::new(|| {
    VanityPatterns::new(DEFAULT_VANITY_PATTERNS).expect("built-in vanity patterns must compile")
});

/// Ordered, case-insensitive URL patterns.
#[derive(Debug, Clone)]
pub struct VanityPatterns {
    patterns: Vec<Regex>,
}

impl VanityPatterns {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> ProxyResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p.as_ref())
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ProxyError::Config(format!("invalid vanity pattern '{}': {}", p.as_ref(), e)))
            })
            .collect::<ProxyResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Whether any pattern matches somewhere in `candidate`.
    pub fn matches(&self, candidate: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(candidate))
    }
}

impl Default for VanityPatterns {
    fn default() -> Self {
        DEFAULT_PATTERNS.clone()
    }
}

/// Normalized resolution result returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedChannel {
    pub is_vanity_url: Option<bool>,
    pub channel_id: Option<String>,
}

impl ResolvedChannel {
    /// Pull the interesting fields out of a `resolve_url` response. Missing
    /// or mistyped fields become `None`.
    pub fn from_upstream(body: &Value) -> Self {
        Self {
            is_vanity_url: body
                .pointer("/endpoint/commandMetadata/resolveUrlCommandMetadata/isVanityUrl")
                .and_then(Value::as_bool),
            channel_id: body
                .pointer("/endpoint/browseEndpoint/browseId")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

pub struct VanityResolver {
    patterns: VanityPatterns,
    cache: Arc<CacheStore>,
    ledger: Arc<QuotaLedger>,
    upstream: Arc<dyn Upstream>,
    endpoint: Url,
}

impl VanityResolver {
    pub fn new(
        config: &AppConfig,
        cache: Arc<CacheStore>,
        ledger: Arc<QuotaLedger>,
        upstream: Arc<dyn Upstream>,
    ) -> ProxyResult<Self> {
        let patterns = match config.resolver.patterns {
            Some(ref patterns) => VanityPatterns::new(patterns.as_slice())?,
            None => VanityPatterns::default(),
        };

        let mut endpoint = Url::parse(&config.upstream.resolve_endpoint).map_err(|e| {
            ProxyError::Config(format!(
                "invalid upstream.resolve_endpoint '{}': {}",
                config.upstream.resolve_endpoint, e
            ))
        })?;
        if let Some(ref key) = config.upstream.resolve_key {
            endpoint.query_pairs_mut().append_pair("key", key);
        }

        Ok(Self {
            patterns,
            cache,
            ledger,
            upstream,
            endpoint,
        })
    }

    /// Resolve a channel reference to `{isVanityUrl, channelId}`.
    ///
    /// The upstream status code is passed through, non-200 included.
    pub async fn resolve(&self, url: &str) -> ProxyResult<JsonResponse> {
        if url.is_empty() {
            return Err(ProxyError::BadRequest("\"url\" query parameter is required".into()));
        }

        if !self.patterns.matches(url) {
            warn!(url, "resolve_url request did not match any vanity format");
            return Err(ProxyError::BadRequest(
                "\"url\" is not an expected vanity url format".into(),
            ));
        }

        let cache_key = resolve_cache_key(url);
        if let Some(cached) = self.cache.get(&cache_key) {
            debug!(cache_key = %cache_key, "cache hit");
            self.ledger.record_resolution(true);
            return Ok(cached.into());
        }

        let request = json!({
            "context": {
                "client": {
                    "clientName": CLIENT_NAME,
                    "clientVersion": CLIENT_VERSION,
                    "hl": CLIENT_LANGUAGE,
                }
            },
            "url": url,
        });
        let response = self.upstream.post_json(self.endpoint.clone(), &request).await?;

        let resolved = ResolvedChannel::from_upstream(&response.body);
        let body = serde_json::to_value(&resolved)?;

        if response.status != 200 {
            warn!(status = response.status, cache_key = %cache_key, "upstream request failed");
        }

        self.ledger.record_resolution(false);
        self.cache.set(cache_key, response.status, body.clone());

        Ok(JsonResponse {
            status: response.status,
            body,
        })
    }
}
