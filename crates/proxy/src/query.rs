//! Query parameter normalization and cache-key construction.

use std::collections::BTreeMap;

use url::form_urlencoded;

/// Query parameters of an inbound request.
///
/// Names are kept sorted so two logically identical queries always
/// serialize the same way. A name given more than once keeps all of its
/// values in arrival order; they are joined with `,` when serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: BTreeMap<String, Vec<String>>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw (still percent-encoded) query string.
    pub fn parse(query: &str) -> Self {
        form_urlencoded::parse(query.as_bytes())
            .filter(|(name, _)| !name.is_empty())
            .collect()
    }

    /// Append a value for `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.entry(name.into()).or_default().push(value.into());
    }

    /// The value for `name`, list values joined with `,`.
    pub fn get(&self, name: &str) -> Option<String> {
        self.params.get(name).map(|values| values.join(","))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.params.retain(|name, _| keep(name));
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// `(name, joined value)` pairs in name order.
    pub fn iter_joined(&self) -> impl Iterator<Item = (&str, String)> {
        self.params
            .iter()
            .map(|(name, values)| (name.as_str(), values.join(",")))
    }

    /// Form-encode the parameters with list commas left readable.
    pub fn to_cache_query(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(self.iter_joined());
        serializer.finish().replace("%2C", ",")
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// Cache key for a `/v3/` list request. The route prefix keeps list keys
/// apart from resolution keys whatever the path.
pub fn list_cache_key(path: &str, params: &QueryParams) -> String {
    format!("/v3/{}?{}", path, params.to_cache_query())
}

/// Cache key for a vanity URL resolution.
pub fn resolve_cache_key(url: &str) -> String {
    format!("/v1/resolve_url?url={}", url)
}
