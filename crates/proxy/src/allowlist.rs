use std::collections::HashSet;

use tubecache_common::{AllowConfig, ALLOW_ALL};

use crate::query::QueryParams;

/// Path and query-parameter allowlist for the `/v3/` endpoint.
///
/// `None` means the dimension was configured with the `*` sentinel and is
/// not filtered.
#[derive(Debug, Clone)]
pub struct AllowlistFilter {
    paths: Option<HashSet<String>>,
    params: Option<HashSet<String>>,
}

fn to_set(values: &[String]) -> Option<HashSet<String>> {
    if values.iter().any(|v| v == ALLOW_ALL) {
        None
    } else {
        Some(values.iter().cloned().collect())
    }
}

impl AllowlistFilter {
    pub fn new(config: &AllowConfig) -> Self {
        Self {
            paths: to_set(&config.paths),
            params: to_set(&config.params),
        }
    }

    pub fn check_path(&self, path: &str) -> bool {
        match self.paths {
            Some(ref allowed) => allowed.contains(path),
            None => true,
        }
    }

    /// Copy of `params` without the names outside the allowlist.
    pub fn filter_params(&self, params: &QueryParams) -> QueryParams {
        let mut filtered = params.clone();
        if let Some(ref allowed) = self.params {
            filtered.retain(|name| {
                let keep = allowed.contains(name);
                if !keep {
                    tracing::debug!(param = name, "dropping disallowed query parameter");
                }
                keep
            });
        }
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(paths: &[&str], params: &[&str]) -> AllowlistFilter {
        AllowlistFilter::new(&AllowConfig {
            paths: paths.iter().map(|s| s.to_string()).collect(),
            params: params.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn path_must_be_listed() {
        let f = filter(&["videos", "channels"], &["*"]);
        assert!(f.check_path("videos"));
        assert!(!f.check_path("search"));
        assert!(!f.check_path("videos/extra"));
    }

    #[test]
    fn wildcard_path_allows_everything() {
        let f = filter(&["*"], &["part"]);
        assert!(f.check_path("search"));
        assert!(f.check_path("anything"));
    }

    #[test]
    fn unknown_params_are_dropped() {
        let f = filter(&["*"], &["part", "id"]);
        let params = QueryParams::parse("part=snippet&id=abc&callback=evil&key=stolen");
        let filtered = f.filter_params(&params);
        assert!(filtered.contains("part"));
        assert!(filtered.contains("id"));
        assert!(!filtered.contains("callback"));
        assert!(!filtered.contains("key"));
        // The input is left untouched.
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn wildcard_params_keep_everything() {
        let f = filter(&["videos"], &["*"]);
        let params = QueryParams::parse("part=snippet&whatever=1");
        assert_eq!(f.filter_params(&params), params);
    }
}
