/// In-process caching module
///
/// Implements the bounded LRU cache with per-entry TTL that backs the
/// gateway's RAG response cache. A single mutex covers the
/// read-and-reorder of `get` and the insert-and-evict of `put`, so reads
/// and writes are linearizable per key.

#[cfg(test)]
mod tests;

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Thread-safe LRU cache with TTL expiration
pub struct LruTtlCache<K: Hash + Eq + Clone, V: Clone> {
    entries: Mutex<LruCache<K, Entry<V>>>,
    ttl: Duration,
}

impl<K: Hash + Eq + Clone, V: Clone> LruTtlCache<K, V> {
    /// Create a cache bounded to `max_size` entries with a uniform TTL
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_size.max(1)).expect("capacity is at least 1");
        LruTtlCache {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Get a value, promoting it to most-recently used. Expired entries
    /// are removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");

        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    /// Insert a value, evicting the least-recently used entry at capacity
    pub fn put(&self, key: K, value: V) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.put(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every expired entry, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let now = Instant::now();

        let expired: Vec<K> = entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }

        expired.len()
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }

    /// Number of entries currently held, including not-yet-collected
    /// expired ones
    pub fn size(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }
}
