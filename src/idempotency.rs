//! Idempotent checkout replay.
//!
//! A client-supplied `Idempotency-Key` header makes checkout safe against
//! timeout-and-resend: the first committed success is cached for five minutes
//! and any repeat of the key inside that window replays the stored response
//! verbatim without re-running the transaction. Failed attempts are never
//! cached, so they remain retryable under the same key.
//!
//! The store is process-local; deployments running several processes behind a
//! load balancer only get per-process replay protection unless they swap in a
//! shared implementation of [`IdempotencyStore`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const SIGNATURE_HEADER: &str = "x-signature";

/// A cached success: the exact response body plus its HMAC signature, exposed
/// to callers as `X-Signature` so a replayed response can be verified.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub body: serde_json::Value,
    pub signature: String,
}

pub trait IdempotencyStore: Send + Sync {
    /// Returns the cached response for `key` if one exists inside the window.
    fn get(&self, key: &str) -> Option<CachedResponse>;

    /// Records a committed success under `key`. Only called after commit.
    fn put(&self, key: &str, response: CachedResponse);

    /// Evicts expired entries; returns how many were removed.
    fn sweep(&self) -> usize;
}

struct Entry {
    stored_at: Instant,
    response: CachedResponse,
}

/// Mutex-guarded in-memory store with lazy expiry on read plus periodic
/// sweeping. The lock is never held across an await point.
pub struct MemoryIdempotencyStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryIdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl IdempotencyStore for MemoryIdempotencyStore {
    fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => {
                Some(entry.response.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: &str, response: CachedResponse) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.to_string(),
            Entry {
                stored_at: Instant::now(),
                response,
            },
        );
    }

    fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() <= self.ttl);
        before - entries.len()
    }
}

/// Spawns the background eviction loop. Sweep cadence only affects memory,
/// not correctness; expiry is also enforced lazily on `get`.
pub fn spawn_sweeper(
    store: Arc<dyn IdempotencyStore>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await; // first tick is immediate
        loop {
            ticker.tick().await;
            let removed = store.sweep();
            if removed > 0 {
                tracing::debug!(removed, "swept expired idempotency records");
            }
        }
    })
}

/// Hex-encoded HMAC-SHA256 of the serialized response body.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret).expect("HMAC-SHA256 accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cached(body: serde_json::Value) -> CachedResponse {
        CachedResponse {
            signature: sign(b"secret", body.to_string().as_bytes()),
            body,
        }
    }

    #[test]
    fn get_returns_stored_response_inside_window() {
        let store = MemoryIdempotencyStore::new(Duration::from_secs(300));
        store.put("abc123", cached(json!({"order": 1})));

        let hit = store.get("abc123").unwrap();
        assert_eq!(hit.body, json!({"order": 1}));
        assert!(store.get("other-key").is_none());
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let store = MemoryIdempotencyStore::new(Duration::ZERO);
        store.put("abc123", cached(json!({})));
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.get("abc123").is_none());
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let store = MemoryIdempotencyStore::new(Duration::ZERO);
        store.put("stale", cached(json!({})));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.sweep(), 1);
        assert_eq!(store.sweep(), 0);

        let fresh = MemoryIdempotencyStore::new(Duration::from_secs(300));
        fresh.put("live", cached(json!({})));
        assert_eq!(fresh.sweep(), 0);
        assert!(fresh.get("live").is_some());
    }

    #[test]
    fn put_overwrites_previous_entry() {
        let store = MemoryIdempotencyStore::new(Duration::from_secs(300));
        store.put("k", cached(json!({"v": 1})));
        store.put("k", cached(json!({"v": 2})));
        assert_eq!(store.get("k").unwrap().body, json!({"v": 2}));
    }

    #[test]
    fn signature_is_deterministic_and_key_sensitive() {
        let body = br#"{"success":true}"#;
        assert_eq!(sign(b"seed", body), sign(b"seed", body));
        assert_ne!(sign(b"seed", body), sign(b"other", body));
        assert_ne!(sign(b"seed", body), sign(b"seed", b"{}"));
        // hex-encoded SHA-256 output
        assert_eq!(sign(b"seed", body).len(), 64);
    }
}
