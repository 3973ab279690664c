use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use tubecache_cache::CacheStore;
use tubecache_common::{AppConfig, ProxyError, ProxyResult, QuotaUserMode};
use tubecache_quota::QuotaLedger;
use url::Url;

use crate::allowlist::AllowlistFilter;
use crate::query::{list_cache_key, QueryParams};
use crate::upstream::{JsonResponse, Upstream};

/// `quotaUser` sent when the caller address is unknown.
pub const UNKNOWN_CALLER: &str = "unknown";

/// Upper bound the upstream accepts for `quotaUser`.
const QUOTA_USER_MAX_LEN: usize = 40;

/// Parameters the proxy sets itself on forwarded requests.
const RESERVED_PARAMS: [&str; 2] = ["key", "quotaUser"];

/// The caller address, with an empty one treated as missing.
pub fn known_caller(caller: Option<&str>) -> Option<&str> {
    caller.filter(|addr| !addr.is_empty())
}

/// Derive the `quotaUser` value for a caller already passed through
/// [`known_caller`].
pub fn quota_user(caller: Option<&str>, mode: QuotaUserMode) -> String {
    let Some(addr) = caller else {
        return UNKNOWN_CALLER.to_string();
    };
    match mode {
        QuotaUserMode::Raw => addr.to_string(),
        QuotaUserMode::Hashed => {
            let mut digest = hex::encode(Sha256::digest(addr.as_bytes()));
            digest.truncate(QUOTA_USER_MAX_LEN);
            digest
        }
    }
}

/// A resource path is one or more non-empty segments with no leading or
/// trailing slash.
fn is_resource_path(path: &str) -> bool {
    !path.is_empty() && path.split('/').all(|segment| !segment.is_empty())
}

/// Serves the generic `/v3/<resource>` list endpoint: allowlist, cache,
/// upstream call and quota bookkeeping.
pub struct Dispatcher {
    allowlist: AllowlistFilter,
    cache: Arc<CacheStore>,
    ledger: Arc<QuotaLedger>,
    upstream: Arc<dyn Upstream>,
    api_base: Url,
    api_key: String,
    quota_user_mode: QuotaUserMode,
}

impl Dispatcher {
    pub fn new(
        config: &AppConfig,
        cache: Arc<CacheStore>,
        ledger: Arc<QuotaLedger>,
        upstream: Arc<dyn Upstream>,
    ) -> ProxyResult<Self> {
        let api_base = Url::parse(&config.upstream.api_base).map_err(|e| {
            ProxyError::Config(format!("invalid upstream.api_base '{}': {}", config.upstream.api_base, e))
        })?;
        if api_base.cannot_be_a_base() {
            return Err(ProxyError::Config(format!(
                "upstream.api_base '{}' cannot be used as a base URL",
                config.upstream.api_base
            )));
        }

        Ok(Self {
            allowlist: AllowlistFilter::new(&config.allowed),
            cache,
            ledger,
            upstream,
            api_base,
            api_key: config.upstream.api_key.clone(),
            quota_user_mode: config.quota.quota_user,
        })
    }

    /// Answer a list request for `path`, from cache when possible.
    pub async fn handle_list(
        &self,
        path: &str,
        params: &QueryParams,
        caller: Option<&str>,
    ) -> ProxyResult<JsonResponse> {
        if !is_resource_path(path) || !self.allowlist.check_path(path) {
            warn!(path, "request path disallowed");
            return Err(ProxyError::Forbidden("Request path disallowed".into()));
        }

        let caller = known_caller(caller);
        if caller.is_none() {
            warn!(path, "caller address unavailable, using \"unknown\" quotaUser");
        }

        let params = self.allowlist.filter_params(params);
        let cache_key = list_cache_key(path, &params);

        if let Some(cached) = self.cache.get(&cache_key) {
            debug!(cache_key = %cache_key, "cache hit");
            self.ledger.record(path, true);
            return Ok(cached.into());
        }

        let quota_user = quota_user(caller, self.quota_user_mode);
        let url = self.upstream_url(path, &params, &quota_user)?;

        let response = self.upstream.get_json(url).await?;

        if response.status != 200 {
            // https://developers.google.com/youtube/v3/docs/errors
            let error_status = response
                .body
                .pointer("/error/status")
                .and_then(Value::as_str)
                .unwrap_or("");
            let error_reason = response
                .body
                .pointer("/error/errors/0/reason")
                .and_then(Value::as_str)
                .unwrap_or("");
            warn!(
                status = response.status,
                error_status,
                error_reason,
                cache_key = %cache_key,
                "upstream request failed"
            );
        }

        self.ledger.record(path, false);
        self.cache.set(cache_key, response.status, response.body.clone());

        Ok(response)
    }

    fn upstream_url(&self, path: &str, params: &QueryParams, quota_user: &str) -> ProxyResult<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| ProxyError::Internal("upstream base URL has no path".into()))?
            .pop_if_empty()
            .extend(path.split('/'));

        url.query_pairs_mut()
            .extend_pairs(
                params
                    .iter_joined()
                    .filter(|(name, _)| !RESERVED_PARAMS.contains(name)),
            )
            .append_pair("key", &self.api_key)
            .append_pair("quotaUser", quota_user);

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_user_modes() {
        assert_eq!(quota_user(Some("203.0.113.9"), QuotaUserMode::Raw), "203.0.113.9");

        let hashed = quota_user(Some("203.0.113.9"), QuotaUserMode::Hashed);
        assert_eq!(hashed.len(), 40);
        assert!(hashed.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(hashed, quota_user(Some("203.0.113.10"), QuotaUserMode::Hashed));
        // Deterministic per caller.
        assert_eq!(hashed, quota_user(Some("203.0.113.9"), QuotaUserMode::Hashed));
    }

    #[test]
    fn missing_caller_is_unknown() {
        assert_eq!(known_caller(Some("")), None);
        assert_eq!(known_caller(Some("203.0.113.9")), Some("203.0.113.9"));
        assert_eq!(quota_user(None, QuotaUserMode::Hashed), UNKNOWN_CALLER);
        assert_eq!(quota_user(known_caller(Some("")), QuotaUserMode::Raw), UNKNOWN_CALLER);
    }

    #[test]
    fn resource_paths_have_no_empty_segments() {
        assert!(is_resource_path("videos"));
        assert!(is_resource_path("captions/download"));
        assert!(!is_resource_path(""));
        assert!(!is_resource_path("/v1/resolve_url"));
        assert!(!is_resource_path("videos/"));
        assert!(!is_resource_path("a//b"));
    }
}
