//! Persistent cache tier
//!
//! Wraps a [`KeyValueStore`] with TTL and cache-format version semantics.
//! The store is opened lazily by the first operation (or by
//! [`PersistentTier::initialize`]); concurrent first callers share one open.
//! If opening fails the tier stays unavailable for the rest of its life and
//! every operation returns [`CacheError::PersistenceUnavailable`] without
//! touching the store again. Closing an open store resets the open state, so
//! the next operation opens it again.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tiercache_common::SharedClock;
use tiercache_domain::{is_expired, CacheError, CachedValue, Partition, Result, StoredEntry};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::ports::KeyValueStore;

pub struct PersistentTier {
    store: Arc<dyn KeyValueStore>,
    clock: SharedClock,
    cache_version: u32,
    init: Mutex<Arc<InitCell>>,
}

type InitCell = OnceCell<std::result::Result<(), String>>;

impl PersistentTier {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: SharedClock, cache_version: u32) -> Self {
        Self { store, clock, cache_version, init: Mutex::new(Arc::new(OnceCell::new())) }
    }

    pub fn cache_version(&self) -> u32 {
        self.cache_version
    }

    /// Opens the store if no earlier call has. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        self.ready().await
    }

    /// `None` until initialization has been attempted, and again after a
    /// successful `close`.
    pub fn is_available(&self) -> Option<bool> {
        self.init.lock().get().map(std::result::Result::is_ok)
    }

    async fn ready(&self) -> Result<()> {
        let cell = Arc::clone(&self.init.lock());
        let outcome = cell.get_or_init(|| self.open_store()).await;
        outcome.clone().map_err(CacheError::PersistenceUnavailable)
    }

    async fn open_store(&self) -> std::result::Result<(), String> {
        match self.store.open().await {
            Ok(()) => {
                debug!(version = self.cache_version, "persistent tier opened");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "persistent tier unavailable; continuing memory-only");
                Err(err.to_string())
            }
        }
    }

    /// Writes `value` under `(partition, key)`, stamped with the current time.
    #[instrument(skip(self, value), fields(partition = %partition))]
    pub async fn put(
        &self,
        partition: Partition,
        key: &str,
        value: CachedValue,
        ttl: Duration,
    ) -> Result<()> {
        self.ready().await?;
        let entry = StoredEntry {
            partition,
            key: key.to_string(),
            value,
            stored_at_ms: self.clock.millis_since_epoch(),
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            version: self.cache_version,
        };
        self.store.put(entry).await
    }

    /// Returns the entry if present, unexpired and of the current version.
    /// Stale entries are deleted on the way out.
    pub async fn get(&self, partition: Partition, key: &str) -> Result<Option<StoredEntry>> {
        self.ready().await?;
        let Some(entry) = self.store.get(partition, key).await? else {
            return Ok(None);
        };

        if self.is_valid(&entry) {
            return Ok(Some(entry));
        }

        debug!(%partition, key, version = entry.version, "dropping stale persistent entry");
        if let Err(err) = self.store.delete(partition, key).await {
            warn!(error = %err, %partition, "failed to purge stale entry");
        }
        Ok(None)
    }

    pub async fn delete(&self, partition: Partition, key: &str) -> Result<bool> {
        self.ready().await?;
        self.store.delete(partition, key).await
    }

    /// Deletes expired and wrong-version entries from one partition.
    pub async fn sweep_expired(&self, partition: Partition) -> Result<usize> {
        self.ready().await?;
        let now = self.clock.millis_since_epoch();
        self.store.delete_expired(partition, now, self.cache_version).await
    }

    /// Sweeps every partition. Stops at the first store failure.
    pub async fn sweep_all(&self) -> Result<usize> {
        let mut removed = 0;
        for partition in Partition::ALL {
            removed += self.sweep_expired(partition).await?;
        }
        Ok(removed)
    }

    /// Valid entries of a partition.
    pub async fn entries(&self, partition: Partition) -> Result<Vec<StoredEntry>> {
        self.ready().await?;
        let entries = self.store.entries(partition).await?;
        Ok(entries.into_iter().filter(|entry| self.is_valid(entry)).collect())
    }

    pub async fn count(&self, partition: Partition) -> Result<usize> {
        self.ready().await?;
        self.store.count(partition).await
    }

    pub async fn clear(&self, partition: Partition) -> Result<usize> {
        self.ready().await?;
        self.store.clear(partition).await
    }

    pub async fn clear_all(&self) -> Result<usize> {
        let mut removed = 0;
        for partition in Partition::ALL {
            removed += self.clear(partition).await?;
        }
        Ok(removed)
    }

    /// Closes the store if it is open. A failed open is not reset.
    pub async fn close(&self) -> Result<()> {
        {
            let mut init = self.init.lock();
            if !matches!(init.get(), Some(Ok(()))) {
                return Ok(());
            }
            *init = Arc::new(OnceCell::new());
        }
        debug!("persistent tier closed");
        self.store.close().await
    }

    fn is_valid(&self, entry: &StoredEntry) -> bool {
        entry.version == self.cache_version && !is_expired(entry, self.clock.millis_since_epoch())
    }
}

impl std::fmt::Debug for PersistentTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentTier")
            .field("cache_version", &self.cache_version)
            .field("available", &self.is_available())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the persistent tier.
    use serde_json::json;
    use tiercache_common::MockClock;

    use super::*;
    use crate::testing::InMemoryStore;

    fn tier(store: &Arc<InMemoryStore>, clock: &MockClock, version: u32) -> PersistentTier {
        PersistentTier::new(store.clone(), Arc::new(clock.clone()), version)
    }

    /// Validates TTL handling for the 100ms entry scenario.
    ///
    /// Assertions:
    /// - Confirms the entry is served at 50ms and missed at 150ms.
    /// - Confirms the expired row is purged by the read.
    #[tokio::test]
    async fn test_ttl_boundaries() {
        let store = Arc::new(InMemoryStore::new());
        let clock = MockClock::new();
        let tier = tier(&store, &clock, 1);

        tier.put(Partition::ApiResponses, "k", CachedValue::json(json!(1)), Duration::from_millis(100))
            .await
            .unwrap();

        clock.advance_millis(50);
        assert!(tier.get(Partition::ApiResponses, "k").await.unwrap().is_some());

        clock.advance_millis(100);
        assert!(tier.get(Partition::ApiResponses, "k").await.unwrap().is_none());
        assert_eq!(store.len(), 0, "expired entry purged on read");
    }

    /// Validates cache-format versioning for the upgraded reader scenario.
    ///
    /// Assertions:
    /// - Confirms a row written under version 1 is a miss under version 2.
    /// - Confirms the row is deleted.
    #[tokio::test]
    async fn test_version_mismatch_is_a_miss_and_purges() {
        let store = Arc::new(InMemoryStore::new());
        let clock = MockClock::new();

        tier(&store, &clock, 1)
            .put(Partition::Components, "c", CachedValue::opaque(json!({"x": 1})), Duration::from_secs(60))
            .await
            .unwrap();

        let upgraded = tier(&store, &clock, 2);
        assert!(upgraded.get(Partition::Components, "c").await.unwrap().is_none());
        assert_eq!(store.len(), 0);
    }

    /// Validates shared initialization for the eight concurrent callers
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the store's `open` runs exactly once.
    #[tokio::test]
    async fn test_open_runs_once_for_concurrent_callers() {
        let store = Arc::new(InMemoryStore::new());
        let tier = Arc::new(tier(&store, &MockClock::new(), 1));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tier = tier.clone();
                tokio::spawn(async move { tier.count(Partition::Images).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 0);
        }
        assert_eq!(store.open_calls(), 1);
        assert_eq!(tier.is_available(), Some(true));
    }

    /// Validates degradation for the failed open scenario.
    ///
    /// Assertions:
    /// - Confirms later calls fail with `PersistenceUnavailable`.
    /// - Confirms the store is never retried, even after `close`.
    #[tokio::test]
    async fn test_failed_open_makes_tier_permanently_unavailable() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_open(true);
        let tier = tier(&store, &MockClock::new(), 1);

        let err = tier.initialize().await.unwrap_err();
        assert!(matches!(err, CacheError::PersistenceUnavailable(_)));
        assert_eq!(tier.is_available(), Some(false));

        store.fail_open(false);
        tier.close().await.unwrap();
        let err = tier.get(Partition::ApiResponses, "k").await.unwrap_err();
        assert!(matches!(err, CacheError::PersistenceUnavailable(_)));
        assert_eq!(store.open_calls(), 1);
        assert_eq!(store.get_calls(), 0);
    }

    /// Validates reopening for the close then initialize scenario.
    ///
    /// Assertions:
    /// - Confirms `close` clears the availability flag.
    /// - Confirms the next `initialize` opens the store again.
    #[tokio::test]
    async fn test_close_allows_reopen() {
        let store = Arc::new(InMemoryStore::new());
        let tier = tier(&store, &MockClock::new(), 1);

        tier.initialize().await.unwrap();
        tier.close().await.unwrap();
        assert_eq!(tier.is_available(), None);

        tier.initialize().await.unwrap();
        assert_eq!(store.open_calls(), 2);
        assert_eq!(tier.is_available(), Some(true));
    }

    /// Validates sweeping for the one-expired-one-live scenario.
    ///
    /// Assertions:
    /// - Confirms `entries` hides the expired row before the sweep.
    /// - Confirms `sweep_all` removes exactly that row.
    #[tokio::test]
    async fn test_sweep_and_entries_skip_stale_rows() {
        let store = Arc::new(InMemoryStore::new());
        let clock = MockClock::new();
        let tier = tier(&store, &clock, 1);

        tier.put(Partition::ApiResponses, "short", CachedValue::json(json!(1)), Duration::from_millis(10))
            .await
            .unwrap();
        tier.put(Partition::ApiResponses, "long", CachedValue::json(json!(2)), Duration::from_secs(60))
            .await
            .unwrap();
        clock.advance_millis(20);

        let live = tier.entries(Partition::ApiResponses).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].key, "long");

        assert_eq!(tier.sweep_all().await.unwrap(), 1);
        assert_eq!(tier.count(Partition::ApiResponses).await.unwrap(), 1);
        assert_eq!(tier.clear_all().await.unwrap(), 1);
    }
}
