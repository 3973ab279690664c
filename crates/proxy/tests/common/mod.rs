#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tubecache_admin::SharedStateType;
use tubecache_cache::CacheStore;
use tubecache_common::{AppConfig, ProxyError, ProxyResult, QuotaUserMode};
use tubecache_proxy::{JsonResponse, ProxyState, Upstream};
use tubecache_quota::QuotaLedger;
use url::Url;

/// One request seen by [`FakeUpstream`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: &'static str,
    pub url: Url,
    pub body: Option<Value>,
}

impl RecordedCall {
    pub fn query(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

enum Reply {
    Json(u16, Value),
    Fail,
}

/// Upstream double that records every call and answers with a fixed reply.
pub struct FakeUpstream {
    calls: Mutex<Vec<RecordedCall>>,
    reply: Mutex<Reply>,
}

impl FakeUpstream {
    pub fn new() -> Arc<Self> {
        Self::replying(200, json!({"kind": "youtube#videoListResponse", "items": []}))
    }

    pub fn replying(status: u16, body: Value) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: Mutex::new(Reply::Json(status, body)),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: Mutex::new(Reply::Fail),
        })
    }

    pub fn set_reply(&self, status: u16, body: Value) {
        *self.reply.lock().unwrap() = Reply::Json(status, body);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn answer(&self, call: RecordedCall) -> ProxyResult<JsonResponse> {
        self.calls.lock().unwrap().push(call);
        match *self.reply.lock().unwrap() {
            Reply::Json(status, ref body) => Ok(JsonResponse {
                status,
                body: body.clone(),
            }),
            Reply::Fail => Err(ProxyError::Internal("upstream request failed: connection refused".into())),
        }
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn get_json(&self, url: Url) -> ProxyResult<JsonResponse> {
        self.answer(RecordedCall {
            method: "GET",
            url,
            body: None,
        })
    }

    async fn post_json(&self, url: Url, body: &Value) -> ProxyResult<JsonResponse> {
        self.answer(RecordedCall {
            method: "POST",
            url,
            body: Some(body.clone()),
        })
    }
}

pub fn test_config(paths: &[&str], params: &[&str]) -> AppConfig {
    let mut config = AppConfig::default();
    config.allowed.paths = paths.iter().map(|s| s.to_string()).collect();
    config.allowed.params = params.iter().map(|s| s.to_string()).collect();
    config.upstream.api_key = "test-key".into();
    config.upstream.api_base = "https://upstream.test/youtube/v3/".into();
    config.upstream.resolve_endpoint = "https://resolver.test/youtubei/v1/navigation/resolve_url".into();
    config.quota.quota_user = QuotaUserMode::Raw;
    config
}

/// Shared state plus the pipeline built on top of it.
pub struct Harness {
    pub shared: SharedStateType,
    pub state: Arc<ProxyState>,
}

pub fn harness(config: AppConfig, ttl: Duration, upstream: Arc<FakeUpstream>) -> Harness {
    let cache = Arc::new(CacheStore::new(ttl));
    let ledger = Arc::new(QuotaLedger::new());
    let shared = tubecache_admin::new_shared_state(config, cache, ledger);
    let state = Arc::new(ProxyState::new(Arc::clone(&shared), upstream).expect("valid test config"));
    Harness { shared, state }
}

/// Collects formatted log output for the current thread.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    /// Install a subscriber writing into this buffer until the guard drops.
    pub fn capture(&self) -> tracing::subscriber::DefaultGuard {
        let buffer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || buffer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.contents().matches(needle).count()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
