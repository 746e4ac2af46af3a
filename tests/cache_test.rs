//! Tests for the LRU + TTL cache.

use std::time::Duration;

use huginn::{Cache, CacheConfig, CacheStats};

fn cache(max_entries: usize) -> Cache<String, u32> {
    Cache::new("test", CacheConfig::new().max_entries(max_entries))
}

#[test]
fn size_never_exceeds_max_entries() {
    let cache = cache(3);
    for i in 0..10 {
        cache.set(format!("k{i}"), i, 0);
        assert!(cache.len() <= 3);
    }
    assert_eq!(cache.stats().evictions, 7);
    assert!(cache.get(&"k9".to_string()).is_some());
    assert!(cache.get(&"k0".to_string()).is_none());
}

#[test]
fn get_refreshes_recency() {
    let cache = cache(2);
    cache.set("a".into(), 1, 0);
    cache.set("b".into(), 2, 0);
    assert_eq!(cache.get(&"a".to_string()), Some(1));

    cache.set("c".into(), 3, 0);

    assert!(cache.has(&"a".to_string()));
    assert!(!cache.has(&"b".to_string()));
    assert!(cache.has(&"c".to_string()));
}

#[test]
fn has_does_not_touch_recency_or_counters() {
    let cache = cache(2);
    cache.set("a".into(), 1, 0);
    cache.set("b".into(), 2, 0);
    assert!(cache.has(&"a".to_string()));

    cache.set("c".into(), 3, 0);

    assert!(!cache.has(&"a".to_string()));
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (0, 0));
}

#[test]
fn byte_budget_evicts_oldest_first() {
    let cache: Cache<String, u32> = Cache::new(
        "bytes",
        CacheConfig::new().max_entries(100).max_bytes(1_000),
    );
    for i in 0..5 {
        cache.set(format!("k{i}"), i, 200);
    }
    assert_eq!(cache.stats().total_size_bytes, 1_000);

    cache.set("k5".into(), 5, 150);

    let stats = cache.stats();
    assert!(stats.total_size_bytes <= 1_000);
    assert_eq!(stats.size, 5);
    assert!(!cache.has(&"k0".to_string()));
    assert!(cache.has(&"k1".to_string()));
}

#[test]
fn oversized_entry_is_never_admitted() {
    let cache: Cache<String, u32> =
        Cache::new("bytes", CacheConfig::new().max_bytes(1_000));
    cache.set("big".into(), 1, 201);
    assert!(!cache.has(&"big".to_string()));
    assert_eq!(cache.stats().size, 0);

    cache.set("fits".into(), 2, 200);
    assert!(cache.has(&"fits".to_string()));
}

#[test]
fn replacing_a_key_releases_its_old_size() {
    let cache: Cache<String, u32> =
        Cache::new("bytes", CacheConfig::new().max_bytes(1_000));
    cache.set("a".into(), 1, 150);
    cache.set("a".into(), 2, 100);
    let stats = cache.stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.total_size_bytes, 100);
    assert_eq!(cache.get(&"a".to_string()), Some(2));
}

#[tokio::test(start_paused = true)]
async fn entries_expire_after_ttl() {
    let cache: Cache<String, u32> =
        Cache::new("ttl", CacheConfig::new().ttl(Duration::from_secs(60)));
    cache.set("a".into(), 1, 0);

    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(cache.get(&"a".to_string()), Some(1));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(!cache.has(&"a".to_string()));
    assert_eq!(cache.get(&"a".to_string()), None);
    assert_eq!(cache.len(), 0, "expired entry should be swept");
}

#[tokio::test(start_paused = true)]
async fn expiry_is_per_entry() {
    let cache: Cache<String, u32> =
        Cache::new("ttl", CacheConfig::new().ttl(Duration::from_secs(10)));
    cache.set("old".into(), 1, 0);
    tokio::time::advance(Duration::from_secs(6)).await;
    cache.set("new".into(), 2, 0);
    tokio::time::advance(Duration::from_secs(6)).await;

    assert_eq!(cache.get(&"old".to_string()), None);
    assert_eq!(cache.get(&"new".to_string()), Some(2));
}

#[test]
fn stats_count_hits_and_misses_until_cleared() {
    let cache = cache(10);
    cache.set("a".into(), 1, 0);
    cache.get(&"a".to_string());
    cache.get(&"a".to_string());
    cache.get(&"missing".to_string());

    let stats = cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate() - 2.0 / 3.0).abs() < f64::EPSILON);

    cache.clear();
    assert_eq!(cache.stats(), CacheStats::default());
}

#[test]
fn reset_stats_keeps_entries() {
    let cache = cache(10);
    cache.set("a".into(), 1, 0);
    cache.get(&"a".to_string());
    cache.reset_stats();

    let stats = cache.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.size, 1);
}

#[test]
fn remove_reports_presence() {
    let cache = cache(10);
    cache.set("a".into(), 1, 0);
    assert!(cache.remove(&"a".to_string()));
    assert!(!cache.remove(&"a".to_string()));
    assert!(cache.is_empty());
}

#[test]
fn default_configs() {
    let results = CacheConfig::default();
    assert_eq!(results.max_entries, 100);
    assert_eq!(results.max_bytes, None);
    assert_eq!(results.ttl, Duration::from_secs(300));

    let resources = CacheConfig::resources();
    assert_eq!(resources.max_entries, 200);
    assert_eq!(resources.max_bytes, Some(50 * 1024 * 1024));
    assert_eq!(resources.ttl, Duration::from_secs(1_800));
}
