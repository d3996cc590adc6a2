//! Two-tier cache façade
//!
//! Reads go memory first, then the persistent tier; a persistent hit is
//! promoted into memory (with its remaining TTL) before it is returned.
//! Writes go to memory and are then written through to the persistent tier.
//! Persistence failures are logged and absorbed, so the cache keeps serving
//! from memory when durable storage is unavailable.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tiercache_common::{
    AsyncCache, CacheConfig, CacheStats, ComponentHealth, Lifecycle, ManagerHealth,
    ManagerStatus, SharedClock, StatusCell,
};
use tiercache_domain::{CacheError, CacheSettings, CachedValue, Partition, Result, TierKey};
use tracing::{debug, info, instrument, warn};

use crate::keys::{derive_key, derive_key_str};
use crate::persistent::PersistentTier;
use crate::ports::KeyValueStore;

/// In-process tier keyed by partition and derived key.
pub type MemoryTier = AsyncCache<TierKey, CachedValue, SharedClock>;

/// An image read back from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

/// Entries removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub memory_removed: usize,
    pub persistent_removed: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.memory_removed + self.persistent_removed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FacadeStats {
    pub memory: CacheStats,
    /// `None` until the persistent tier has been opened
    pub persistent_available: Option<bool>,
    #[serde(serialize_with = "partition_counts")]
    pub persistent_counts: BTreeMap<Partition, usize>,
}

impl FacadeStats {
    pub fn persistent_total(&self) -> usize {
        self.persistent_counts.values().sum()
    }
}

fn partition_counts<S: Serializer>(
    counts: &BTreeMap<Partition, usize>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(counts.iter().map(|(partition, count)| (partition.as_str(), count)))
}

/// Cache façade over the memory and persistent tiers.
pub struct CacheFacade {
    memory: MemoryTier,
    persistent: PersistentTier,
    clock: SharedClock,
    default_ttl: Duration,
    status: StatusCell,
}

impl CacheFacade {
    pub fn new(settings: &CacheSettings, store: Arc<dyn KeyValueStore>, clock: SharedClock) -> Self {
        let config = CacheConfig::builder()
            .max_size(settings.max_memory_items)
            .ttl(settings.default_ttl)
            .max_bytes(settings.max_memory_size_bytes)
            .build();
        let memory = AsyncCache::with_clock(config, clock.clone())
            .with_weigher(CachedValue::approximate_size);
        let persistent = PersistentTier::new(store, clock.clone(), settings.cache_version);

        Self { memory, persistent, clock, default_ttl: settings.default_ttl, status: StatusCell::default() }
    }

    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    pub fn persistent(&self) -> &PersistentTier {
        &self.persistent
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // ------------------------------------------------------------------
    // Content-class helpers
    // ------------------------------------------------------------------

    pub async fn cache_api_response(&self, url: &str, response: &Value, ttl: Option<Duration>) {
        let key = derive_key_str(url);
        self.store(Partition::ApiResponses, &key, CachedValue::json(response.clone()), ttl).await;
    }

    pub async fn get_cached_api_response(&self, url: &str) -> Option<Value> {
        match self.lookup(Partition::ApiResponses, &derive_key_str(url)).await? {
            CachedValue::Json { value } => Some(value),
            other => {
                debug!(class = other.content_class(), "api response slot holds non-json value");
                None
            }
        }
    }

    pub async fn cache_image(
        &self,
        url: &str,
        data: Vec<u8>,
        content_type: Option<String>,
        ttl: Option<Duration>,
    ) {
        let key = derive_key_str(url);
        self.store(Partition::Images, &key, CachedValue::binary(data, content_type), ttl).await;
    }

    pub async fn get_cached_image(&self, url: &str) -> Option<CachedImage> {
        match self.lookup(Partition::Images, &derive_key_str(url)).await? {
            CachedValue::Binary { content_type, data } => Some(CachedImage { data, content_type }),
            _ => None,
        }
    }

    /// Caches component state under a key derived from `identifier`.
    pub async fn cache_component_data<T: Serialize + ?Sized>(
        &self,
        identifier: &T,
        data: Value,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let key = derive_key(identifier)?;
        self.store(Partition::Components, &key, CachedValue::opaque(data), ttl).await;
        Ok(())
    }

    pub async fn get_cached_component_data<T: Serialize + ?Sized>(
        &self,
        identifier: &T,
    ) -> Result<Option<Value>> {
        let key = derive_key(identifier)?;
        Ok(match self.lookup(Partition::Components, &key).await {
            Some(CachedValue::Opaque { value } | CachedValue::Json { value }) => Some(value),
            _ => None,
        })
    }

    // ------------------------------------------------------------------
    // Generic access
    // ------------------------------------------------------------------

    /// Writes to memory, then through to the persistent tier.
    #[instrument(skip(self, value), fields(partition = %partition))]
    pub async fn store(
        &self,
        partition: Partition,
        key: &str,
        value: CachedValue,
        ttl: Option<Duration>,
    ) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.memory.insert_with_ttl(TierKey::new(partition, key), value.clone(), ttl).await;

        if let Err(err) = self.persist(partition, key, value, ttl).await {
            warn!(error = %err, key, "persistent write failed; entry kept in memory only");
        }
    }

    async fn persist(
        &self,
        partition: Partition,
        key: &str,
        value: CachedValue,
        ttl: Duration,
    ) -> Result<()> {
        self.persistent.put(partition, key, value, ttl).await
    }

    /// Memory, then persistent with promotion.
    ///
    /// Promotion is skipped when memory was written or cleared while the
    /// persistent read was in flight, so an older row never shadows a newer
    /// write or resurrects a removed entry.
    pub async fn lookup(&self, partition: Partition, key: &str) -> Option<CachedValue> {
        let tier_key = TierKey::new(partition, key);
        let generation = self.memory.generation().await;
        if let Some(value) = self.memory.get(&tier_key).await {
            return Some(value);
        }

        let entry = match self.persistent.get(partition, key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(err) => {
                debug!(error = %err, %partition, "persistent read skipped");
                return None;
            }
        };

        let remaining = entry.remaining_ttl(self.clock.millis_since_epoch());
        let promoted = self
            .memory
            .insert_if_unchanged(tier_key, entry.value.clone(), remaining, generation)
            .await;
        debug!(%partition, key, remaining = ?remaining, promoted, "persistent hit");
        Some(entry.value)
    }

    /// Removes one entry from both tiers. Returns whether either held it.
    pub async fn remove(&self, partition: Partition, key: &str) -> bool {
        let in_memory = self.memory.remove(&TierKey::new(partition, key)).await.is_some();
        let persisted = match self.persistent.delete(partition, key).await {
            Ok(existed) => existed,
            Err(err) => {
                warn!(error = %err, %partition, "persistent delete failed");
                false
            }
        };
        in_memory || persisted
    }

    /// Removes every entry of one partition from both tiers. Returns the
    /// number of persisted rows deleted.
    pub async fn clear_partition(&self, partition: Partition) -> usize {
        let in_memory = self.memory.remove_where(|key| key.partition == partition).await;
        let persisted = self.persistent.clear(partition).await.unwrap_or_else(|err| {
            warn!(error = %err, %partition, "persistent clear failed");
            0
        });
        debug!(%partition, in_memory, persisted, "partition cleared");
        persisted
    }

    /// Sweeps expired entries from both tiers and every partition.
    #[instrument(skip(self))]
    pub async fn clear_expired(&self) -> SweepReport {
        let memory_removed = self.memory.cleanup_expired().await;
        let persistent_removed = self.persistent.sweep_all().await.unwrap_or_else(|err| {
            warn!(error = %err, "persistent sweep failed");
            0
        });
        let report = SweepReport { memory_removed, persistent_removed };
        debug!(memory = memory_removed, persistent = persistent_removed, "sweep finished");
        report
    }

    pub async fn clear_all(&self) {
        self.memory.clear().await;
        if let Err(err) = self.persistent.clear_all().await {
            warn!(error = %err, "persistent clear failed");
        }
    }

    pub async fn stats(&self) -> FacadeStats {
        let memory = self.memory.stats().await;
        let persistent_available = self.persistent.is_available();

        let mut persistent_counts = BTreeMap::new();
        if persistent_available == Some(true) {
            for partition in Partition::ALL {
                match self.persistent.count(partition).await {
                    Ok(count) => {
                        persistent_counts.insert(partition, count);
                    }
                    Err(err) => warn!(error = %err, %partition, "persistent count failed"),
                }
            }
        }

        FacadeStats { memory, persistent_available, persistent_counts }
    }
}

impl std::fmt::Debug for CacheFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheFacade")
            .field("memory", &self.memory)
            .field("persistent", &self.persistent)
            .field("status", &self.status.get())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Lifecycle for CacheFacade {
    type Error = CacheError;

    fn name(&self) -> &'static str {
        "cache_facade"
    }

    async fn initialize(&self) -> Result<()> {
        if !self.status.transition(
            &[ManagerStatus::Created, ManagerStatus::Shutdown, ManagerStatus::Error],
            ManagerStatus::Initializing,
        ) {
            return Ok(());
        }

        match self.persistent.initialize().await {
            Ok(()) => info!(version = self.persistent.cache_version(), "cache facade ready"),
            Err(err) => warn!(error = %err, "cache facade running memory-only"),
        }
        self.status.set(ManagerStatus::Running);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.status.transition(&[ManagerStatus::Running], ManagerStatus::ShuttingDown) {
            return Ok(());
        }
        if let Err(err) = self.persistent.close().await {
            warn!(error = %err, "failed to close persistent store");
        }
        self.status.set(ManagerStatus::Shutdown);
        info!("cache facade shut down");
        Ok(())
    }

    async fn health_check(&self) -> ManagerHealth {
        let status = self.status.get();
        if !status.is_running() {
            return ManagerHealth::unhealthy(format!("cache facade is {status}"));
        }

        let memory = ComponentHealth::healthy("memory_tier");
        match self.persistent.is_available() {
            Some(false) => ManagerHealth::degraded(0.6, "persistent tier unavailable")
                .with_component(memory)
                .with_component(ComponentHealth::unhealthy("persistent_tier", "open failed")),
            _ => ManagerHealth::healthy()
                .with_component(memory)
                .with_component(ComponentHealth::healthy("persistent_tier")),
        }
    }

    fn status(&self) -> ManagerStatus {
        self.status.get()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the cache façade.
    use serde_json::json;
    use tiercache_common::MockClock;

    use super::*;
    use crate::testing::InMemoryStore;

    fn facade(max_items: usize) -> (CacheFacade, Arc<InMemoryStore>, MockClock) {
        let store = Arc::new(InMemoryStore::new());
        let clock = MockClock::new();
        let settings = CacheSettings { max_memory_items: max_items, ..CacheSettings::default() };
        (CacheFacade::new(&settings, store.clone(), clock.shared()), store, clock)
    }

    /// Validates write-through for the single API response scenario.
    ///
    /// Assertions:
    /// - Confirms the entry lands in memory and in the store.
    /// - Confirms it reads back unchanged.
    #[tokio::test]
    async fn test_writes_reach_both_tiers() {
        let (facade, store, _) = facade(10);
        facade.cache_api_response("https://example.test/a", &json!({"n": 1}), None).await;

        assert_eq!(facade.memory().len().await, 1);
        assert!(store.peek(Partition::ApiResponses, &derive_key_str("https://example.test/a")).is_some());
        assert_eq!(
            facade.get_cached_api_response("https://example.test/a").await,
            Some(json!({"n": 1}))
        );
    }

    /// Validates promotion TTL for the partially aged entry scenario.
    ///
    /// Assertions:
    /// - Confirms a promoted copy expires with the original entry rather
    ///   than a full TTL after promotion.
    #[tokio::test]
    async fn test_promotion_keeps_remaining_ttl() {
        let (facade, store, clock) = facade(10);
        facade
            .cache_api_response("u", &json!(1), Some(Duration::from_millis(100)))
            .await;
        facade.memory().clear().await;

        clock.advance_millis(60);
        assert_eq!(facade.get_cached_api_response("u").await, Some(json!(1)));
        let gets = store.get_calls();

        clock.advance_millis(50);
        assert_eq!(facade.get_cached_api_response("u").await, None);
        assert!(store.get_calls() > gets);
    }

    /// Validates partition isolation for the shared URL scenario.
    ///
    /// Assertions:
    /// - Confirms an API response and an image under the same URL coexist.
    #[tokio::test]
    async fn test_partitions_do_not_collide() {
        let (facade, _, _) = facade(10);
        facade.cache_api_response("same", &json!("api"), None).await;
        facade.cache_image("same", vec![1, 2, 3], Some("image/png".into()), None).await;

        assert_eq!(facade.get_cached_api_response("same").await, Some(json!("api")));
        let image = facade.get_cached_image("same").await.unwrap();
        assert_eq!(image.data, vec![1, 2, 3]);
    }

    /// Validates `clear_expired` for the one-stale-one-live scenario.
    ///
    /// Assertions:
    /// - Confirms the report counts one removal per tier.
    #[tokio::test]
    async fn test_clear_expired_reports_both_tiers() {
        let (facade, _, clock) = facade(10);
        facade.cache_api_response("a", &json!(1), Some(Duration::from_millis(10))).await;
        facade.cache_api_response("b", &json!(2), Some(Duration::from_secs(10))).await;
        clock.advance_millis(20);

        let report = facade.clear_expired().await;
        assert_eq!(report, SweepReport { memory_removed: 1, persistent_removed: 1 });
        assert_eq!(report.total(), 2);
    }

    /// Validates `clear_partition` for the memory-evicted rows scenario.
    ///
    /// Assertions:
    /// - Confirms the returned count is the number of persisted rows deleted,
    ///   even when memory held fewer entries.
    /// - Confirms other partitions are untouched.
    #[tokio::test]
    async fn test_clear_partition_returns_persisted_count() {
        let (facade, _, _) = facade(1);
        facade.cache_api_response("a", &json!(1), None).await;
        facade.cache_api_response("b", &json!(2), None).await;
        facade.cache_api_response("c", &json!(3), None).await;
        facade.cache_image("logo", vec![1], None, None).await;

        assert_eq!(facade.clear_partition(Partition::ApiResponses).await, 3);
        assert_eq!(facade.get_cached_api_response("a").await, None);
        assert!(facade.get_cached_image("logo").await.is_some());
    }

    /// Validates the lifecycle for the store that cannot open scenario.
    ///
    /// Assertions:
    /// - Confirms the façade runs degraded rather than failing.
    /// - Confirms it keeps serving from memory.
    #[tokio::test]
    async fn test_lifecycle_degrades_when_store_cannot_open() {
        let (facade, store, _) = facade(10);
        store.fail_open(true);

        facade.initialize().await.unwrap();
        assert_eq!(facade.status(), ManagerStatus::Running);

        let health = facade.health_check().await;
        assert!(health.is_healthy);
        assert!(health.score < 1.0);
        assert!(!health.component("persistent_tier").unwrap().is_healthy);

        facade.cache_api_response("u", &json!(true), None).await;
        assert_eq!(facade.get_cached_api_response("u").await, Some(json!(true)));

        facade.shutdown().await.unwrap();
        assert_eq!(facade.status(), ManagerStatus::Shutdown);
    }

    /// Validates the lifecycle for the shutdown then initialize scenario.
    ///
    /// Assertions:
    /// - Confirms the store is opened again on restart.
    /// - Confirms writes after the restart reach the store.
    #[tokio::test]
    async fn test_restart_reopens_store() {
        let (facade, store, _) = facade(10);
        facade.initialize().await.unwrap();
        facade.shutdown().await.unwrap();
        assert_eq!(facade.persistent().is_available(), None);

        facade.initialize().await.unwrap();
        assert_eq!(store.open_calls(), 2);
        assert_eq!(facade.persistent().is_available(), Some(true));

        facade.cache_api_response("after", &json!(1), None).await;
        assert!(store.peek(Partition::ApiResponses, &derive_key_str("after")).is_some());
        assert!(facade.health_check().await.is_healthy);
    }

    /// Validates `stats` for the mixed partitions scenario.
    ///
    /// Assertions:
    /// - Confirms per-partition counts and the serialized partition names.
    #[tokio::test]
    async fn test_stats_include_partition_counts() {
        let (facade, _, _) = facade(10);
        facade.initialize().await.unwrap();
        facade.cache_api_response("a", &json!(1), None).await;
        facade.cache_component_data(&json!({"id": "hero"}), json!({"open": true}), None).await.unwrap();

        let stats = facade.stats().await;
        assert_eq!(stats.memory.size, 2);
        assert_eq!(stats.persistent_available, Some(true));
        assert_eq!(stats.persistent_counts[&Partition::ApiResponses], 1);
        assert_eq!(stats.persistent_counts[&Partition::Components], 1);
        assert_eq!(stats.persistent_total(), 2);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["persistent_counts"]["apiResponses"], 1);
    }
}
