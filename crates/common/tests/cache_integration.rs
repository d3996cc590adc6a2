//! Integration tests for the cache module
//!
//! Exercises TTL expiry, LRU ordering and concurrent access through the
//! public `AsyncCache` API.

#![cfg(feature = "runtime")]

use std::sync::Arc;
use std::time::Duration;

use tiercache_common::cache::{AsyncCache, CacheConfig};
use tiercache_common::resilience::MockClock;

/// Verifies the two-entry LRU example end to end.
///
/// # Test Steps
/// 1. Insert A and B into a cache bounded at two entries
/// 2. Read A so B becomes least recently used
/// 3. Insert C
/// 4. Verify B is evicted while A and C remain
#[tokio::test]
async fn test_lru_bound_of_two_evicts_least_recent() {
    let cache: AsyncCache<&'static str, &'static str> = AsyncCache::new(CacheConfig::lru(2));

    cache.insert("A", "alpha").await;
    cache.insert("B", "beta").await;
    assert_eq!(cache.get(&"A").await, Some("alpha"));
    cache.insert("C", "gamma").await;

    assert_eq!(cache.get(&"A").await, Some("alpha"));
    assert_eq!(cache.get(&"B").await, None);
    assert_eq!(cache.get(&"C").await, Some("gamma"));
}

/// Verifies TTL expiry with a controllable clock.
///
/// # Test Steps
/// 1. Insert with a 100ms TTL
/// 2. Advance 50ms and verify a hit
/// 3. Advance to 150ms and verify a miss
#[tokio::test]
async fn test_ttl_hit_then_miss() {
    let clock = MockClock::new();
    let cache = AsyncCache::with_clock(CacheConfig::default(), clock.clone());

    cache.insert_with_ttl("k".to_string(), 1u32, Duration::from_millis(100)).await;

    clock.advance_millis(50);
    assert_eq!(cache.get(&"k".to_string()).await, Some(1));

    clock.advance_millis(100);
    assert_eq!(cache.get(&"k".to_string()).await, None);

    let stats = cache.stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.expirations, 1);
}

/// Verifies clones share storage and counters.
///
/// # Test Steps
/// 1. Insert through one handle
/// 2. Read through a clone
/// 3. Verify stats on the original reflect the clone's hit
#[tokio::test]
async fn test_clones_share_state() {
    let cache: AsyncCache<String, Vec<u8>> =
        AsyncCache::new(CacheConfig::lru(4)).with_weigher(|value: &Vec<u8>| value.len());
    let clone = cache.clone();

    cache.insert("img".to_string(), vec![1, 2, 3]).await;
    assert_eq!(clone.get(&"img".to_string()).await, Some(vec![1, 2, 3]));

    let stats = cache.stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.approx_bytes, 3);
}

/// Verifies the capacity bound holds under concurrent writers.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_never_exceed_bound() {
    let cache = Arc::new(AsyncCache::<String, usize>::new(CacheConfig::lru(16)));
    let mut handles = Vec::new();

    for task in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            for i in 0..32 {
                cache.insert(format!("{task}-{i}"), i).await;
                assert!(cache.len().await <= 16);
            }
        }));
    }

    for handle in handles {
        handle.await.expect("writer task panicked");
    }

    assert_eq!(cache.len().await, 16);
}
