// SPDX-License-Identifier: AGPL-3.0-or-later

//! Volatile session cache: identity → current live access token.
//!
//! This cache is the authority on whether a cryptographically valid access
//! token is still *the* live one for an identity. Logout and rotation
//! invalidate a still-unexpired token simply by dropping or replacing the
//! entry. Absence (TTL expiry, LRU eviction, restart) is expected steady
//! state and just forces the refresh path, never an error.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

/// Cached entry: access token value + insertion timestamp + its TTL.
struct CachedAccessEntry {
    token: String,
    inserted_at: Instant,
    ttl: Duration,
}

/// In-process expiring cache for live access tokens.
pub struct SessionCache {
    cache: Mutex<LruCache<String, CachedAccessEntry>>,
}

impl SessionCache {
    /// Create a cache holding at most `capacity` identities.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap()),
            )),
        }
    }

    /// Record `token` as the live access token for `identity`.
    pub fn put(&self, identity: &str, token: &str, ttl_seconds: u64) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                identity.to_string(),
                CachedAccessEntry {
                    token: token.to_string(),
                    inserted_at: Instant::now(),
                    ttl: Duration::from_secs(ttl_seconds),
                },
            );
        }
    }

    /// Get the live access token for `identity`, if any.
    ///
    /// Returns `None` if no entry exists or the entry has expired.
    pub fn get(&self, identity: &str) -> Option<String> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(identity) {
            if entry.inserted_at.elapsed() < entry.ttl {
                return Some(entry.token.clone());
            }
            // Expired — remove it
            cache.pop(identity);
        }
        None
    }

    /// Drop the entry for `identity`. No-op if absent.
    pub fn delete(&self, identity: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(identity);
        }
    }
}
