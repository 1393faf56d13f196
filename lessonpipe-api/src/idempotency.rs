//! Idempotency-Key replay cache
//!
//! Mutating endpoints accept an `Idempotency-Key` header; a repeat within
//! the configured window returns the original response verbatim. Entries
//! are evicted lazily on access.

use axum::http::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Clone)]
struct CachedResponse {
    stored_at: Instant,
    status: StatusCode,
    body: Value,
}

/// Keyed replay cache with a bounded time window
#[derive(Clone)]
pub struct IdempotencyCache {
    entries: Arc<Mutex<HashMap<String, CachedResponse>>>,
    window: Duration,
}

impl IdempotencyCache {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            window,
        }
    }

    /// The stored response for `key`, if one exists inside the window
    pub fn get(&self, key: &str) -> Option<(StatusCode, Value)> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(cached) if cached.stored_at.elapsed() <= self.window => {
                Some((cached.status, cached.body.clone()))
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: &str, status: StatusCode, body: Value) {
        let mut entries = self.entries.lock().unwrap();
        // Opportunistic sweep keeps the map from growing unboundedly
        let window = self.window;
        entries.retain(|_, cached| cached.stored_at.elapsed() <= window);
        entries.insert(
            key.to_string(),
            CachedResponse {
                stored_at: Instant::now(),
                status,
                body,
            },
        );
    }
}
