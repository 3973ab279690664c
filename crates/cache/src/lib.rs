//! Response cache for the proxy.
//!
//! Entries map a normalized request signature to the upstream status code
//! and JSON body captured for it. Every entry lives for the store's TTL,
//! measured from insertion. Expired entries are never returned by
//! [`CacheStore::get`]; a background sweep removes the ones nobody reads
//! again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

/// A captured upstream response.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub body: Value,
    pub inserted_at: Instant,
}

struct Slot {
    response: CachedResponse,
    expires_at: Instant,
}

/// Concurrent TTL cache keyed by request signature.
pub struct CacheStore {
    entries: DashMap<String, Slot>,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(ttl: Duration) -> Self {
        tracing::info!(ttl_secs = ttl.as_secs(), "creating response cache");
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live entry. An expired entry found here is removed.
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let now = Instant::now();
        if let Some(slot) = self.entries.get(key) {
            if slot.expires_at > now {
                return Some(slot.response.clone());
            }
        } else {
            return None;
        }

        // Only drop the entry if it is still the expired one; a concurrent
        // writer may have replaced it since the read guard was released.
        self.entries.remove_if(key, |_, slot| slot.expires_at <= now);
        None
    }

    /// Insert or replace the entry for `key`.
    pub fn set(&self, key: impl Into<String>, status: u16, body: Value) {
        let now = Instant::now();
        let slot = Slot {
            response: CachedResponse {
                status,
                body,
                inserted_at: now,
            },
            expires_at: now + self.ttl,
        };
        self.entries.insert(key.into(), slot);
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_key, slot| slot.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn a Tokio task that purges expired entries every `interval`.
    ///
    /// The task holds an `Arc` to the store and runs until the runtime
    /// shuts down.
    pub fn start_sweep_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, remaining = store.len(), "cache sweep complete");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    #[test]
    fn get_returns_what_was_set() {
        let store = CacheStore::new(Duration::from_secs(300));
        store.set("videos?id=abc&part=snippet", 200, json!({"items": [1, 2]}));

        let hit = store.get("videos?id=abc&part=snippet").unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body, json!({"items": [1, 2]}));
        assert!(store.get("videos?id=xyz&part=snippet").is_none());
    }

    #[test]
    fn set_overwrites_existing_entry() {
        let store = CacheStore::new(Duration::from_secs(300));
        store.set("k", 500, json!({"error": "boom"}));
        store.set("k", 200, json!({"ok": true}));

        let hit = store.get("k").unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body, json!({"ok": true}));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_entries_are_never_returned() {
        let store = CacheStore::new(Duration::from_millis(30));
        store.set("k", 200, json!(1));
        assert!(store.get("k").is_some());

        thread::sleep(Duration::from_millis(60));

        assert!(store.get("k").is_none());
        // The read also dropped the stale entry.
        assert!(store.is_empty());
    }

    #[test]
    fn purge_drops_only_expired_entries() {
        let store = CacheStore::new(Duration::from_millis(30));
        store.set("old", 200, json!(1));
        thread::sleep(Duration::from_millis(60));
        store.set("fresh", 200, json!(2));

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("fresh").is_some());
    }

    #[tokio::test]
    async fn sweep_task_purges_in_background() {
        let store = Arc::new(CacheStore::new(Duration::from_millis(20)));
        store.set("k", 200, json!(1));
        let handle = store.start_sweep_task(Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(store.is_empty());
        handle.abort();
    }
}
