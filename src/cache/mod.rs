//! Caching subsystem.
//!
//! One generic [`Cache`] policy (LRU + TTL, optional byte budget), used for
//! two independent instances:
//!
//! - [`ResultCache`]: full search-result sets and fetched notes, keyed by
//!   [`search_key`] / [`note_key`]. Count-bounded only.
//! - [`ResourceCache`]: resolved binary resources keyed by resource id.
//!   Count- and byte-bounded, since image payloads can be large.
//!
//! Both are owned by the client that builds them; nothing here is global.

mod lru;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

pub use lru::Cache;

use crate::api::{Note, NoteSummary, SearchOptions};
use crate::resolve::ResolvedResource;

/// Which of the client's caches an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Search results and notes.
    Results,
    /// Resolved resources (images and attachments).
    Resources,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Results => "results",
            CacheKind::Resources => "resources",
        }
    }
}

/// Configuration for a [`Cache`].
///
/// ```rust
/// # use huginn::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(500)
///     .max_bytes(10 * 1024 * 1024)
///     .ttl(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries. Default: 100.
    pub max_entries: usize,
    /// Byte budget across all entries; `None` bounds by count only. Default: none.
    pub max_bytes: Option<u64>,
    /// Time-to-live for entries. Default: 5 minutes.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            max_bytes: None,
            ttl: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    /// Create a new config with the search-result defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for the resource cache: 200 entries, 50 MiB, 30 minutes.
    pub fn resources() -> Self {
        Self {
            max_entries: 200,
            max_bytes: Some(50 * 1024 * 1024),
            ttl: Duration::from_secs(30 * 60),
        }
    }

    /// Set the maximum number of entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the byte budget.
    pub fn max_bytes(mut self, bytes: u64) -> Self {
        self.max_bytes = Some(bytes);
        self
    }

    /// Set the time-to-live.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Counters and occupancy of one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub total_size_bytes: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Value stored in the result cache.
#[derive(Debug, Clone)]
pub enum CachedResult {
    Search(Vec<NoteSummary>),
    Note(Note),
}

/// Search results and notes.
pub type ResultCache = Cache<String, CachedResult>;

/// Resolved resources by id.
pub type ResourceCache = Cache<String, Arc<ResolvedResource>>;

/// Result-cache key for a search.
pub fn search_key(query: &str, options: &SearchOptions) -> String {
    format!("search:{query}|{}", options.cache_fragment())
}

/// Result-cache key for a single note.
pub fn note_key(id: &str) -> String {
    format!("note:{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_key_differs_on_query() {
        let options = SearchOptions::default();
        assert_ne!(search_key("cats", &options), search_key("dogs", &options));
    }

    #[test]
    fn search_key_differs_on_options() {
        let a = SearchOptions::default();
        let b = SearchOptions::default().limit(5);
        assert_ne!(search_key("cats", &a), search_key("cats", &b));
    }

    #[test]
    fn note_and_search_keys_do_not_collide() {
        assert_ne!(note_key("abc"), search_key("abc", &SearchOptions::default()));
    }

    #[test]
    fn hit_rate_handles_no_lookups() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
