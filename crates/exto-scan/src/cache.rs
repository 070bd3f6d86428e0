//! Bounded, TTL-based in-memory cache.
//!
//! Used for the category read cache and the last-active coalescing cache.
//! Entries expire `ttl` after insertion; when full, the oldest entry is
//! evicted. Stale reads within the TTL are expected.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct BoundedTtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    capacity: usize,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedTtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    /// Looks `key` up as of `now`, dropping it if expired.
    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            Some(entry) if now.saturating_duration_since(entry.inserted_at) < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    pub fn insert_at(&self, key: K, value: V, now: Instant) {
        let mut entries = self.lock();
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            entries.retain(|_, e| now.saturating_duration_since(e.inserted_at) < self.ttl);
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
            },
        );
    }

    pub fn remove(&self, key: &K) {
        self.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        // The map stays consistent even if a holder panicked.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_ttl() {
        let cache = BoundedTtlCache::new(10, Duration::from_secs(60));
        let t0 = Instant::now();
        cache.insert_at("a", 1, t0);

        assert_eq!(cache.get_at(&"a", t0 + Duration::from_secs(59)), Some(1));
        assert_eq!(cache.get_at(&"a", t0 + Duration::from_secs(60)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn oldest_entry_is_evicted_at_capacity() {
        let cache = BoundedTtlCache::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        cache.insert_at("a", 1, t0);
        cache.insert_at("b", 2, t0 + Duration::from_secs(1));
        cache.insert_at("c", 3, t0 + Duration::from_secs(2));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_at(&"a", t0 + Duration::from_secs(3)), None);
        assert_eq!(cache.get_at(&"c", t0 + Duration::from_secs(3)), Some(3));
    }

    #[test]
    fn overwriting_a_key_does_not_evict() {
        let cache = BoundedTtlCache::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        cache.insert_at("a", 1, t0);
        cache.insert_at("b", 2, t0);
        cache.insert_at("a", 10, t0 + Duration::from_secs(1));

        assert_eq!(cache.get_at(&"a", t0 + Duration::from_secs(2)), Some(10));
        assert_eq!(cache.get_at(&"b", t0 + Duration::from_secs(2)), Some(2));
    }
}
