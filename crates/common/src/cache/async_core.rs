//! Async in-memory cache with per-entry TTL and strict LRU eviction.
//!
//! All mutation goes through a single `tokio::sync::RwLock`, so eviction and
//! the insert that triggered it are one critical section. Expired entries are
//! purged lazily on access and in bulk by [`AsyncCache::cleanup_expired`].
//!
//! Recency is tracked with a logical access tick rather than wall time: two
//! operations landing on the same `Instant` still have a well-defined order,
//! and entries that were never read are evicted in insertion order.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use super::config::CacheConfig;
use super::stats::{CacheStats, MetricsCollector};
use crate::resilience::{Clock, SystemClock};

type Weigher<V> = Arc<dyn Fn(&V) -> usize + Send + Sync>;

/// A cached value plus the bookkeeping used for expiry and eviction.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_accessed: Instant,
    ttl: Option<Duration>,
    access_count: u64,
    access_tick: u64,
    insertion_order: u64,
    size_bytes: usize,
}

impl<V> CacheEntry<V> {
    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn inserted_at(&self) -> Instant {
        self.inserted_at
    }

    pub fn last_accessed(&self) -> Instant {
        self.last_accessed
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Time left before the entry expires, `None` for entries without TTL.
    pub fn remaining_ttl(&self, now: Instant) -> Option<Duration> {
        self.ttl.map(|ttl| ttl.saturating_sub(now.saturating_duration_since(self.inserted_at)))
    }
}

/// Returns `true` once more than `ttl` has elapsed since insertion.
///
/// An entry is still valid at exactly `inserted_at + ttl`.
pub fn is_expired<V>(entry: &CacheEntry<V>, now: Instant) -> bool {
    entry.ttl.is_some_and(|ttl| now.saturating_duration_since(entry.inserted_at) > ttl)
}

/// Entry map plus the counters that order it.
pub struct CacheStorage<K, V> {
    data: HashMap<K, CacheEntry<V>>,
    tick: u64,
    insertion_counter: u64,
    approx_bytes: usize,
    generation: u64,
}

impl<K, V> Default for CacheStorage<K, V> {
    fn default() -> Self {
        Self { data: HashMap::new(), tick: 0, insertion_counter: 0, approx_bytes: 0, generation: 0 }
    }
}

impl<K, V> fmt::Debug for CacheStorage<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStorage")
            .field("len", &self.data.len())
            .field("approx_bytes", &self.approx_bytes)
            .finish()
    }
}

impl<K, V> CacheStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn approx_bytes(&self) -> usize {
        self.approx_bytes
    }

    pub fn entry(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.data.get(key)
    }

    /// Bumped by every insert, removal and clear.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove_entry(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let entry = self.data.remove(key)?;
        self.approx_bytes = self.approx_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    /// Key of the least recently used entry.
    fn lru_victim(&self) -> Option<K> {
        self.data
            .iter()
            .min_by_key(|(_, entry)| (entry.access_tick, entry.insertion_order))
            .map(|(key, _)| key.clone())
    }
}

/// Drops every expired entry, returning the new state and how many entries
/// were removed.
pub fn evict_expired<K, V>(mut storage: CacheStorage<K, V>, now: Instant) -> (CacheStorage<K, V>, usize)
where
    K: Eq + Hash + Clone,
{
    let before = storage.data.len();
    let mut freed = 0usize;
    storage.data.retain(|_, entry| {
        let keep = !is_expired(entry, now);
        if !keep {
            freed += entry.size_bytes;
        }
        keep
    });
    storage.approx_bytes = storage.approx_bytes.saturating_sub(freed);
    let removed = before - storage.data.len();
    (storage, removed)
}

/// Async cache with per-entry TTL and least-recently-used eviction.
///
/// # Type Parameters
///
/// * `K` - Key type (must implement `Eq + Hash + Clone`)
/// * `V` - Value type (must implement `Clone`)
/// * `C` - Clock type for time operations (defaults to `SystemClock`)
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use tiercache_common::cache::{AsyncCache, CacheConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let cache: AsyncCache<String, i32> =
///         AsyncCache::new(CacheConfig::ttl_lru(Duration::from_secs(60), 100));
///
///     cache.insert("key".to_string(), 42).await;
///     assert_eq!(cache.get(&"key".to_string()).await, Some(42));
/// }
/// ```
pub struct AsyncCache<K, V, C = SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock + Clone,
{
    storage: Arc<RwLock<CacheStorage<K, V>>>,
    config: CacheConfig,
    metrics: MetricsCollector,
    weigher: Option<Weigher<V>>,
    clock: C,
}

impl<K, V> AsyncCache<K, V, SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a new async cache with the specified configuration and default
    /// system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<K, V, C> AsyncCache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock + Clone,
{
    /// Creates a new async cache with the specified configuration and clock.
    pub fn with_clock(config: CacheConfig, clock: C) -> Self {
        Self {
            storage: Arc::new(RwLock::new(CacheStorage::default())),
            config,
            metrics: MetricsCollector::default(),
            weigher: None,
            clock,
        }
    }

    /// Sets the function used to approximate each value's size in bytes.
    pub fn with_weigher<F>(mut self, weigher: F) -> Self
    where
        F: Fn(&V) -> usize + Send + Sync + 'static,
    {
        self.weigher = Some(Arc::new(weigher));
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Inserts a value using the configured default TTL.
    pub async fn insert(&self, key: K, value: V) {
        self.insert_entry(key, value, self.config.ttl).await;
    }

    /// Inserts a value that expires `ttl` after now.
    pub async fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.insert_entry(key, value, Some(ttl)).await;
    }

    /// Current write generation.
    ///
    /// Read it before a slow lookup elsewhere and hand it to
    /// [`insert_if_unchanged`](Self::insert_if_unchanged) to detect writes
    /// that landed in between.
    pub async fn generation(&self) -> u64 {
        self.storage.read().await.generation()
    }

    /// Inserts `value` only if `key` is absent and no insert, removal or
    /// clear happened since `generation` was read. The check and the insert
    /// share one write lock. Returns whether the value was stored.
    pub async fn insert_if_unchanged(&self, key: K, value: V, ttl: Duration, generation: u64) -> bool {
        if self.config.max_size == Some(0) {
            return false;
        }

        let now = self.clock.now();
        let size_bytes = self.weigher.as_ref().map_or(0, |weigh| weigh(&value));

        let mut storage = self.storage.write().await;
        let present = storage.data.get(&key).is_some_and(|entry| !is_expired(entry, now));
        if present || storage.generation != generation {
            return false;
        }
        self.insert_locked(&mut storage, key, value, Some(ttl), now, size_bytes);
        true
    }

    async fn insert_entry(&self, key: K, value: V, ttl: Option<Duration>) {
        if self.config.max_size == Some(0) {
            return;
        }

        let now = self.clock.now();
        let size_bytes = self.weigher.as_ref().map_or(0, |weigh| weigh(&value));

        let mut storage = self.storage.write().await;
        self.insert_locked(&mut storage, key, value, ttl, now, size_bytes);
    }

    fn insert_locked(
        &self,
        storage: &mut CacheStorage<K, V>,
        key: K,
        value: V,
        ttl: Option<Duration>,
        now: Instant,
        size_bytes: usize,
    ) {
        storage.bump_generation();

        // Overwrites replace the old entry wholesale.
        storage.remove_entry(&key);

        if let Some(max_size) = self.config.max_size {
            if storage.data.len() >= max_size {
                let current = std::mem::take(storage);
                let (purged, removed) = evict_expired(current, now);
                *storage = purged;
                self.metrics.record_expirations(removed);
            }
            while storage.data.len() >= max_size {
                let Some(victim) = storage.lru_victim() else { break };
                storage.remove_entry(&victim);
                self.metrics.record_eviction();
            }
        }

        let tick = storage.next_tick();
        let insertion_order = storage.insertion_counter;
        storage.insertion_counter += 1;
        storage.approx_bytes += size_bytes;
        storage.data.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                last_accessed: now,
                ttl,
                access_count: 0,
                access_tick: tick,
                insertion_order,
                size_bytes,
            },
        );
        self.metrics.record_insert();
    }

    /// Retrieves a value, refreshing its recency.
    ///
    /// Returns `None` if the key is absent or expired; an expired entry is
    /// removed as a side effect.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.get_with_remaining_ttl(key).await.map(|(value, _)| value)
    }

    /// Like [`get`](Self::get) but also returns the entry's remaining TTL.
    pub async fn get_with_remaining_ttl(&self, key: &K) -> Option<(V, Option<Duration>)> {
        let now = self.clock.now();
        let mut storage = self.storage.write().await;

        let expired = match storage.data.get(key) {
            None => {
                self.metrics.record_miss();
                return None;
            }
            Some(entry) => is_expired(entry, now),
        };

        if expired {
            storage.remove_entry(key);
            self.metrics.record_expirations(1);
            self.metrics.record_miss();
            return None;
        }

        let tick = storage.next_tick();
        let entry = storage.data.get_mut(key)?;
        entry.last_accessed = now;
        entry.access_count += 1;
        entry.access_tick = tick;
        self.metrics.record_hit();
        Some((entry.value.clone(), entry.remaining_ttl(now)))
    }

    /// Removes and returns a value from the cache.
    pub async fn remove(&self, key: &K) -> Option<V> {
        let mut storage = self.storage.write().await;
        storage.bump_generation();
        storage.remove_entry(key).map(|entry| entry.value)
    }

    /// Removes every entry whose key matches `predicate`.
    pub async fn remove_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let mut storage = self.storage.write().await;
        let keys: Vec<K> = storage.data.keys().filter(|key| predicate(key)).cloned().collect();
        storage.bump_generation();
        for key in &keys {
            storage.remove_entry(key);
        }
        keys.len()
    }

    /// Checks if a key exists and is not expired, without touching recency.
    pub async fn contains_key(&self, key: &K) -> bool {
        let now = self.clock.now();
        let storage = self.storage.read().await;
        storage.data.get(key).is_some_and(|entry| !is_expired(entry, now))
    }

    /// Returns the current number of entries in the cache.
    pub async fn len(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Returns `true` if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.storage.read().await.is_empty()
    }

    /// Clears all entries from the cache.
    pub async fn clear(&self) {
        let mut storage = self.storage.write().await;
        storage.bump_generation();
        storage.data.clear();
        storage.approx_bytes = 0;
    }

    /// Removes all expired entries and returns the count of removed entries.
    pub async fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut storage = self.storage.write().await;
        let current = std::mem::take(&mut *storage);
        let (next, removed) = evict_expired(current, now);
        *storage = next;
        self.metrics.record_expirations(removed);
        removed
    }

    /// Returns current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let storage = self.storage.read().await;
        self.metrics.snapshot(
            storage.len(),
            storage.approx_bytes(),
            self.config.max_size,
            self.config.max_bytes,
        )
    }
}

impl<K, V, C> Clone for AsyncCache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock + Clone,
{
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            weigher: self.weigher.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<K, V, C> fmt::Debug for AsyncCache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCache").field("config", &self.config).finish_non_exhaustive()
    }
}
