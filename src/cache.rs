// src/cache.rs
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    loaded_at: Instant,
}

/// Get-or-load cache with lazy TTL expiry.
///
/// Entries are checked for staleness on access only; there is no background
/// sweeper. A zero TTL makes every lookup a miss, which is how tests run the
/// read path against a disabled cache. Concurrent loads for the same key are
/// not deduplicated; the last loader to finish wins, which is harmless for
/// the read-only values stored here.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached value if present and fresh.
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().unwrap();
        entries.get(key).and_then(|entry| {
            if entry.loaded_at.elapsed() < self.ttl {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key,
            Entry {
                value,
                loaded_at: Instant::now(),
            },
        );
    }

    /// Returns the fresh cached value, or runs `loader` and caches its result.
    pub fn get_or_load<E>(&self, key: K, loader: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = loader()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.write().unwrap().remove(key);
    }

    /// Drops every entry whose key matches the predicate.
    pub fn invalidate_if(&self, mut pred: impl FnMut(&K) -> bool) {
        self.entries.write().unwrap().retain(|k, _| !pred(k));
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}
