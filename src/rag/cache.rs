//! Short-TTL key-value cache (§5: "Collection settings are cached in a
//! short-TTL key-value cache; invalidation is by `del(key)` on update.").
//!
//! Generalized from the teacher's LRU embedding cache: same entry/eviction
//! shape, but keyed generically and scoped to wall-clock TTL rather than
//! content-hash keys, since here the thing being cached (collection
//! settings, feedback-vote reference links) is small and mutable rather than
//! an immutable embedding.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Default TTL applied when a caller doesn't specify one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Feedback-vote reference links are valid for 24h (§6).
pub const FEEDBACK_LINK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A generic, thread-safe, TTL-expiring cache.
pub struct ShortTtlCache<V: Clone> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    default_ttl: Duration,
}

impl<V: Clone> ShortTtlCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            default_ttl,
        }
    }

    /// Look up `key`. Expired entries are treated as a miss and lazily
    /// removed.
    pub fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(key) {
                if entry.expires_at > Instant::now() {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.entries.write().remove(key);
        None
    }

    /// Insert or overwrite `key`, using `ttl` or the cache's default.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
        self.entries.write().insert(key.into(), Entry { value, expires_at });
    }

    /// Remove `key`, matching the `del(key)` invalidation policy of §5.
    pub fn del(&self, key: &str) {
        self.entries.write().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses) * 100.0
        }
    }
}

impl<V: Clone> Default for ShortTtlCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let cache: ShortTtlCache<String> = ShortTtlCache::default();
        cache.set("collection:c1", "settings-json".to_string(), None);
        assert_eq!(cache.get("collection:c1"), Some("settings-json".to_string()));
    }

    #[test]
    fn del_invalidates() {
        let cache: ShortTtlCache<String> = ShortTtlCache::default();
        cache.set("k", "v".to_string(), None);
        cache.del("k");
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache: ShortTtlCache<String> = ShortTtlCache::default();
        cache.set("k", "v".to_string(), Some(Duration::from_nanos(1)));
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn hit_rate_tracks_usage() {
        let cache: ShortTtlCache<i32> = ShortTtlCache::default();
        cache.set("k", 1, None);
        let _ = cache.get("k");
        let _ = cache.get("missing");
        assert!((cache.hit_rate() - 50.0).abs() < 0.001);
    }
}
