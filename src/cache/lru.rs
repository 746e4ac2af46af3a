//! Generic LRU + TTL cache with an optional byte budget.
//!
//! Entries live in an [`IndexMap`] ordered least-recently-touched first: a hit
//! moves the entry to the back, eviction pops from the front. Both operations
//! are O(1) amortized (`shift_remove` is O(n) in the worst case but the maps
//! here are small and bounded).

use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tokio::time::Instant;
use tracing::debug;

use super::{CacheConfig, CacheStats};
use crate::telemetry;

/// Largest share of the byte budget a single entry may occupy.
const MAX_ENTRY_SHARE_DIVISOR: u64 = 5;

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    size_bytes: u64,
}

struct Inner<K, V> {
    entries: IndexMap<K, CacheEntry<V>>,
    total_size_bytes: u64,
    /// Earliest instant at which any entry can expire.
    next_expiry: Option<Instant>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Thread-safe bounded cache shared by reference (wrap in `Arc`).
///
/// An entry is valid while `now - created_at < ttl`. Expired entries are
/// logically absent and physically swept on the next `get`/`set`.
pub struct Cache<K, V> {
    name: &'static str,
    config: CacheConfig,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create an empty cache. `name` labels log lines and metrics.
    pub fn new(name: &'static str, config: CacheConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                entries: IndexMap::new(),
                total_size_bytes: 0,
                next_expiry: None,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// The configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a valid entry, marking it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        let now = Instant::now();
        self.sweep_expired(&mut inner, now);

        match inner.entries.shift_remove(key) {
            Some(entry) => {
                let value = entry.value.clone();
                inner.entries.insert(key.clone(), entry);
                inner.hits += 1;
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "cache" => self.name).increment(1);
                Some(value)
            }
            None => {
                inner.misses += 1;
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "cache" => self.name)
                    .increment(1);
                None
            }
        }
    }

    /// Insert `value` at the most-recently-used position.
    ///
    /// An entry larger than a fifth of the byte budget is silently rejected.
    /// Otherwise the oldest entries are evicted until both the entry-count and
    /// byte budgets have room.
    pub fn set(&self, key: K, value: V, size_bytes: u64) {
        if self.config.max_entries == 0 {
            return;
        }
        if let Some(max_bytes) = self.config.max_bytes
            && size_bytes.saturating_mul(MAX_ENTRY_SHARE_DIVISOR) > max_bytes
        {
            debug!(
                cache = self.name,
                size_bytes, max_bytes, "entry exceeds per-entry size limit, not cached"
            );
            return;
        }

        let mut inner = self.lock();
        let now = Instant::now();
        self.sweep_expired(&mut inner, now);

        if let Some(old) = inner.entries.shift_remove(&key) {
            inner.total_size_bytes -= old.size_bytes;
        }

        let mut evicted = 0u64;
        while inner.entries.len() >= self.config.max_entries {
            evicted += Self::evict_oldest(&mut inner);
        }
        if let Some(max_bytes) = self.config.max_bytes {
            while inner.total_size_bytes + size_bytes > max_bytes && !inner.entries.is_empty() {
                evicted += Self::evict_oldest(&mut inner);
            }
        }
        if evicted > 0 {
            inner.evictions += evicted;
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "cache" => self.name)
                .increment(evicted);
            debug!(cache = self.name, evicted, "evicted least recently used entries");
        }

        let expires_at = now + self.config.ttl;
        inner.next_expiry = Some(match inner.next_expiry {
            Some(existing) => existing.min(expires_at),
            None => expires_at,
        });
        inner.total_size_bytes += size_bytes;
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                size_bytes,
            },
        );
    }

    /// Whether a valid entry exists. Does not affect recency or counters.
    pub fn has(&self, key: &K) -> bool {
        let inner = self.lock();
        let now = Instant::now();
        inner
            .entries
            .get(key)
            .is_some_and(|entry| self.is_valid(entry, now))
    }

    /// Remove an entry, returning whether one was present.
    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.lock();
        match inner.entries.shift_remove(key) {
            Some(entry) => {
                inner.total_size_bytes -= entry.size_bytes;
                true
            }
            None => false,
        }
    }

    /// Drop every entry and reset the hit/miss/eviction counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.total_size_bytes = 0;
        inner.next_expiry = None;
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }

    /// Reset the counters without dropping entries.
    pub fn reset_stats(&self) {
        let mut inner = self.lock();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }

    /// Snapshot of counters and occupancy.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.entries.len(),
            total_size_bytes: inner.total_size_bytes,
        }
    }

    /// Number of physically present entries (expired ones included until swept).
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        // Every mutation leaves the map consistent, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_valid(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) < self.config.ttl
    }

    fn sweep_expired(&self, inner: &mut Inner<K, V>, now: Instant) {
        match inner.next_expiry {
            Some(at) if now >= at => {}
            _ => return,
        }

        let ttl = self.config.ttl;
        let mut freed = 0u64;
        let mut next_expiry: Option<Instant> = None;
        inner.entries.retain(|_, entry| {
            if now.saturating_duration_since(entry.created_at) < ttl {
                let expires_at = entry.created_at + ttl;
                next_expiry = Some(next_expiry.map_or(expires_at, |e| e.min(expires_at)));
                true
            } else {
                freed += entry.size_bytes;
                false
            }
        });
        inner.total_size_bytes -= freed;
        inner.next_expiry = next_expiry;
    }

    fn evict_oldest(inner: &mut Inner<K, V>) -> u64 {
        match inner.entries.shift_remove_index(0) {
            Some((_, entry)) => {
                inner.total_size_bytes -= entry.size_bytes;
                1
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cache(max_entries: usize, max_bytes: Option<u64>) -> Cache<String, u32> {
        let mut config = CacheConfig::new()
            .max_entries(max_entries)
            .ttl(Duration::from_secs(60));
        config.max_bytes = max_bytes;
        Cache::new("test", config)
    }

    #[test]
    fn replacing_a_key_releases_its_old_size() {
        let cache = cache(10, Some(1_000));
        cache.set("a".into(), 1, 150);
        cache.set("a".into(), 2, 100);
        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.total_size_bytes, 100);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn zero_capacity_never_stores() {
        let cache = cache(0, None);
        cache.set("a".into(), 1, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn remove_reports_presence() {
        let cache = cache(10, None);
        cache.set("a".into(), 1, 0);
        assert!(cache.remove(&"a".to_string()));
        assert!(!cache.remove(&"a".to_string()));
    }

    #[test]
    fn entry_at_exactly_a_fifth_is_admitted() {
        let cache = cache(10, Some(1_000));
        cache.set("a".into(), 1, 200);
        cache.set("b".into(), 1, 201);
        assert!(cache.has(&"a".to_string()));
        assert!(!cache.has(&"b".to_string()));
    }
}
