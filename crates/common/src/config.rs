use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Sentinel that disables allowlist filtering for a dimension.
pub const ALLOW_ALL: &str = "*";

/// Top-level proxy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub allowed: AllowConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: Vec<String>,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default)]
    pub cors_whitelist: Vec<String>,
    /// Trust one reverse-proxy hop when deriving the caller address.
    #[serde(default = "default_true")]
    pub trust_proxy: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            static_dir: default_static_dir(),
            cors_whitelist: vec![],
            trust_proxy: true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_resolve_endpoint")]
    pub resolve_endpoint: String,
    #[serde(default, skip_serializing)]
    pub resolve_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: String::new(),
            resolve_endpoint: default_resolve_endpoint(),
            resolve_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

// Credentials stay out of debug output.
impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &"<redacted>")
            .field("resolve_endpoint", &self.resolve_endpoint)
            .field("resolve_key", &self.resolve_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Allowed `/v3/` path segments and query parameter names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowConfig {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub params: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_check_period")]
    pub check_period_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            check_period_secs: default_check_period(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    #[serde(default = "default_quota_user_mode")]
    pub quota_user: QuotaUserMode,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval(),
            quota_user: default_quota_user_mode(),
        }
    }
}

/// How the caller address is turned into the upstream `quotaUser` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaUserMode {
    /// Forward the address as-is.
    Raw,
    /// Forward a truncated SHA-256 digest of the address.
    Hashed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rate_limit_algorithm")]
    pub algorithm: RateLimitAlgorithm,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: default_rate_limit_algorithm(),
            window_ms: default_window_ms(),
            limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAlgorithm {
    FixedWindow,
    SlidingWindow,
}

/// Vanity URL matching rules. `None` keeps the built-in pattern list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_admin_listen")]
    pub listen: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_admin_listen(),
        }
    }
}

// Default value helpers
fn default_listen() -> Vec<String> {
    vec!["0.0.0.0:3000".to_string()]
}
fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}
fn default_true() -> bool {
    true
}
fn default_api_base() -> String {
    "https://www.googleapis.com/youtube/v3/".to_string()
}
fn default_resolve_endpoint() -> String {
    "https://youtubei.googleapis.com/youtubei/v1/navigation/resolve_url".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_cache_ttl() -> u64 {
    300
}
fn default_check_period() -> u64 {
    5
}
fn default_report_interval() -> u64 {
    60
}
fn default_quota_user_mode() -> QuotaUserMode {
    QuotaUserMode::Hashed
}
fn default_rate_limit_algorithm() -> RateLimitAlgorithm {
    RateLimitAlgorithm::FixedWindow
}
fn default_window_ms() -> u64 {
    60_000
}
fn default_limit() -> u64 {
    152
}
fn default_admin_listen() -> String {
    "127.0.0.1:9090".to_string()
}

/// Split a comma-separated environment value, dropping blank items.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number(name: &str, value: &str) -> anyhow::Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{} must be a positive integer: {}", name, e))
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load the YAML file if it exists, overlay the process environment and
    /// validate the result.
    pub fn load_with_env(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from environment-style variables.
    ///
    /// `lookup` resolves a variable name to its value, which keeps this
    /// testable without touching the real process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            let port = parse_number("PORT", &port)?;
            self.server.listen = vec![format!("0.0.0.0:{}", port)];
        }
        if let Some(origins) = lookup("CORS_WHITELIST") {
            self.server.cors_whitelist = split_list(&origins);
        }
        if let Some(paths) = lookup("API_ALLOWED_PATHS") {
            self.allowed.paths = split_list(&paths);
        }
        if let Some(params) = lookup("API_ALLOWED_PARAMS") {
            self.allowed.params = split_list(&params);
        }
        if let Some(key) = lookup("API_V3_KEY") {
            self.upstream.api_key = key;
        }
        if let Some(key) = lookup("RESOLVE_API_KEY") {
            self.upstream.resolve_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(ttl) = lookup("CACHE_TTL_SEC") {
            self.cache.ttl_secs = parse_number("CACHE_TTL_SEC", &ttl)?;
        }
        if let Some(window) = lookup("LIMIT_WINDOW_MS") {
            self.rate_limit.window_ms = parse_number("LIMIT_WINDOW_MS", &window)?;
        }
        if let Some(limit) = lookup("LIMIT_COUNT") {
            self.rate_limit.limit = parse_number("LIMIT_COUNT", &limit)?;
        }
        Ok(())
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.listen.is_empty() {
            anyhow::bail!("server.listen must have at least one address");
        }
        if self.allowed.paths.is_empty() {
            anyhow::bail!("allowed.paths must list at least one path (or \"*\")");
        }
        if self.allowed.params.is_empty() {
            anyhow::bail!("allowed.params must list at least one parameter (or \"*\")");
        }
        if self.upstream.api_key.is_empty() {
            anyhow::bail!("upstream.api_key is required (or set API_V3_KEY)");
        }
        if self.cache.ttl_secs == 0 {
            anyhow::bail!("cache.ttl_secs must be greater than zero");
        }
        if self.cache.check_period_secs == 0 {
            anyhow::bail!("cache.check_period_secs must be greater than zero");
        }
        if self.quota.report_interval_secs == 0 {
            anyhow::bail!("quota.report_interval_secs must be greater than zero");
        }
        if self.rate_limit.enabled && (self.rate_limit.limit == 0 || self.rate_limit.window_ms == 0) {
            anyhow::bail!("rate_limit.limit and rate_limit.window_ms must be greater than zero");
        }
        if let Some(ref patterns) = self.resolver.patterns {
            if patterns.is_empty() {
                anyhow::bail!("resolver.patterns must not be empty when set");
            }
        }
        Ok(())
    }
}
