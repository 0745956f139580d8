//! RouteCache - stream id to resolved outputs, with expiry
//!
//! - Entries expire lazily: an entry read at or after `inserted + ttl` is a miss
//! - LRU eviction once `capacity` is reached, expired entries go first
//! - Hit/miss statistics
//!
//! Concurrent misses for the same key are not coalesced; every missing caller
//! computes the value and the last insert wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use contracts::Clock;

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheStats {
    /// Hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

struct Entry<V> {
    value: V,
    inserted: Instant,
    last_access: u64,
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    tick: u64,
}

/// Expiring LRU cache keyed by string
pub struct RouteCache<V> {
    inner: Mutex<Inner<V>>,
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
    stats: CacheStats,
}

impl<V: Clone> RouteCache<V> {
    /// Create a cache; a zero capacity is treated as one entry
    pub fn new(ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                tick: 0,
            }),
            ttl,
            capacity: capacity.max(1),
            clock,
            stats: CacheStats::default(),
        }
    }

    /// Look up a live entry, dropping it if expired
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;

        let hit = match inner.entries.get_mut(key) {
            Some(entry) if now.saturating_duration_since(entry.inserted) < self.ttl => {
                entry.last_access = tick;
                Some(entry.value.clone())
            }
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        };
        drop(inner);

        match &hit {
            Some(_) => self.stats.hits.fetch_add(1, Ordering::Relaxed),
            None => self.stats.misses.fetch_add(1, Ordering::Relaxed),
        };
        observability::record_route_cache_lookup(hit.is_some());
        hit
    }

    /// Insert or replace an entry, stamping it with the current time
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            let ttl = self.ttl;
            let before = inner.entries.len();
            inner
                .entries
                .retain(|_, entry| now.saturating_duration_since(entry.inserted) < ttl);
            let mut evicted = (before - inner.entries.len()) as u64;

            if inner.entries.len() >= self.capacity {
                let lru = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_access)
                    .map(|(k, _)| k.clone());
                if let Some(lru) = lru {
                    inner.entries.remove(&lru);
                    evicted += 1;
                }
            }
            self.stats.evictions.fetch_add(evicted, Ordering::Relaxed);
        }

        inner.entries.insert(
            key,
            Entry {
                value,
                inserted: now,
                last_access: tick,
            },
        );
    }

    /// Drop one entry
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of stored entries, expired ones included until touched
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ManualClock;

    fn cache(ttl_ms: u64, capacity: usize) -> (RouteCache<u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = RouteCache::new(Duration::from_millis(ttl_ms), capacity, clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_entry_live_until_ttl() {
        let (cache, clock) = cache(1000, 10);
        cache.insert("errors", 1);

        clock.advance(Duration::from_millis(999));
        assert_eq!(cache.get("errors"), Some(1));

        clock.advance(Duration::from_millis(2));
        assert_eq!(cache.get("errors"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entry_expired_exactly_at_ttl() {
        let (cache, clock) = cache(1000, 10);
        cache.insert("errors", 1);
        clock.advance(Duration::from_millis(1000));
        assert_eq!(cache.get("errors"), None);
    }

    #[test]
    fn test_reinsert_restarts_ttl() {
        let (cache, clock) = cache(1000, 10);
        cache.insert("s", 1);
        clock.advance(Duration::from_millis(800));
        cache.insert("s", 2);
        clock.advance(Duration::from_millis(800));
        assert_eq!(cache.get("s"), Some(2));
    }

    #[test]
    fn test_lru_eviction() {
        let (cache, _clock) = cache(60_000, 2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        // Touch "a" so "b" is least recently used
        assert_eq!(cache.get("a"), Some(1));
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().evictions.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_expired_entries_evicted_before_lru() {
        let (cache, clock) = cache(1000, 2);
        cache.insert("old", 1);
        clock.advance(Duration::from_millis(600));
        cache.insert("fresh", 2);
        clock.advance(Duration::from_millis(500));
        // "old" is expired, "fresh" is not
        cache.insert("new", 3);

        assert_eq!(cache.get("fresh"), Some(2));
        assert_eq!(cache.get("new"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_stats() {
        let (cache, _clock) = cache(1000, 10);
        cache.insert("a", 1);
        cache.get("a");
        cache.get("b");
        assert_eq!(cache.stats().hits.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats().misses.load(Ordering::Relaxed), 1);
        assert!((cache.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalidate() {
        let (cache, _clock) = cache(1000, 10);
        cache.insert("a", 1);
        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.get("a"), None);
    }
}
