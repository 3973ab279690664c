use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tubecache_cache::CachedResponse;
use tubecache_common::{ProxyError, ProxyResult};
use url::Url;

/// Status code and JSON body of an upstream response.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonResponse {
    pub status: u16,
    pub body: Value,
}

impl From<CachedResponse> for JsonResponse {
    fn from(cached: CachedResponse) -> Self {
        Self {
            status: cached.status,
            body: cached.body,
        }
    }
}

/// Transport to the upstream API.
///
/// Implementations must hand back non-2xx responses as ordinary
/// [`JsonResponse`]s and only fail on transport or decoding problems.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn get_json(&self, url: Url) -> ProxyResult<JsonResponse>;

    async fn post_json(&self, url: Url, body: &Value) -> ProxyResult<JsonResponse>;
}

/// [`Upstream`] over HTTPS using a shared `reqwest` client.
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> ProxyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn read(response: reqwest::Response) -> ProxyResult<JsonResponse> {
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.map_err(transport_error)?;
        Ok(JsonResponse { status, body })
    }
}

/// Upstream URLs carry credentials, so they are stripped before the error
/// is formatted.
fn transport_error(err: reqwest::Error) -> ProxyError {
    ProxyError::Internal(format!("upstream request failed: {}", err.without_url()))
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn get_json(&self, url: Url) -> ProxyResult<JsonResponse> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        Self::read(response).await
    }

    async fn post_json(&self, url: Url, body: &Value) -> ProxyResult<JsonResponse> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read(response).await
    }
}
