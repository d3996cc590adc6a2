//! Integration tests for the two-tier cache façade.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tiercache_common::MockClock;
use tiercache_core::keys::derive_key_str;
use tiercache_core::testing::InMemoryStore;
use tiercache_core::{CacheFacade, KeyValueStore};
use tiercache_domain::{CacheSettings, CachedValue, Partition, Result, StoredEntry};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

fn build(max_items: usize) -> (CacheFacade, Arc<InMemoryStore>, MockClock) {
    let store = Arc::new(InMemoryStore::new());
    let clock = MockClock::new();
    let settings = CacheSettings { max_memory_items: max_items, ..CacheSettings::default() };
    let facade = CacheFacade::new(&settings, store.clone(), clock.shared());
    (facade, store, clock)
}

/// Store whose next `get` reads its row, then waits for `release` before
/// returning it.
#[derive(Default)]
struct HeldReadStore {
    inner: InMemoryStore,
    hold_next_get: AtomicBool,
    parked: Notify,
    released: Notify,
}

impl HeldReadStore {
    fn hold_next_get(&self) {
        self.hold_next_get.store(true, Ordering::SeqCst);
    }

    async fn wait_until_parked(&self) {
        self.parked.notified().await;
    }

    fn release(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl KeyValueStore for HeldReadStore {
    async fn open(&self) -> Result<()> {
        self.inner.open().await
    }

    async fn put(&self, entry: StoredEntry) -> Result<()> {
        self.inner.put(entry).await
    }

    async fn get(&self, partition: Partition, key: &str) -> Result<Option<StoredEntry>> {
        let row = self.inner.get(partition, key).await;
        if self.hold_next_get.swap(false, Ordering::SeqCst) {
            self.parked.notify_one();
            self.released.notified().await;
        }
        row
    }

    async fn delete(&self, partition: Partition, key: &str) -> Result<bool> {
        self.inner.delete(partition, key).await
    }

    async fn delete_expired(&self, partition: Partition, now_ms: i64, version: u32) -> Result<usize> {
        self.inner.delete_expired(partition, now_ms, version).await
    }

    async fn entries(&self, partition: Partition) -> Result<Vec<StoredEntry>> {
        self.inner.entries(partition).await
    }

    async fn count(&self, partition: Partition) -> Result<usize> {
        self.inner.count(partition).await
    }

    async fn clear(&self, partition: Partition) -> Result<usize> {
        self.inner.clear(partition).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

/// Builds a façade whose persistent tier holds `v1` for "u" and whose memory
/// is empty, then starts a read that stalls after loading `v1`.
async fn stalled_read() -> (Arc<CacheFacade>, Arc<HeldReadStore>, JoinHandle<Option<Value>>) {
    let store = Arc::new(HeldReadStore::default());
    let facade = Arc::new(CacheFacade::new(
        &CacheSettings::default(),
        store.clone(),
        MockClock::new().shared(),
    ));
    facade.cache_api_response("u", &json!("v1"), None).await;
    facade.memory().clear().await;

    store.hold_next_get();
    let reader = tokio::spawn({
        let facade = facade.clone();
        async move { facade.get_cached_api_response("u").await }
    });
    store.wait_until_parked().await;
    (facade, store, reader)
}

/// Validates promotion for the write during a persistent read scenario.
///
/// Assertions:
/// - Confirms the stalled reader still gets the value it loaded.
/// - Confirms memory serves the newer write afterwards, matching the
///   persistent tier.
#[tokio::test]
async fn test_promotion_does_not_overwrite_newer_write() {
    let (facade, store, reader) = stalled_read().await;

    facade.cache_api_response("u", &json!("v2"), None).await;
    store.release();
    assert_eq!(reader.await.unwrap(), Some(json!("v1")));

    assert_eq!(facade.get_cached_api_response("u").await, Some(json!("v2")));
    let persisted = store.inner.peek(Partition::ApiResponses, &derive_key_str("u")).unwrap();
    assert_eq!(persisted.value, CachedValue::json(json!("v2")));
}

/// Validates promotion for the removal during a persistent read scenario.
///
/// Assertions:
/// - Confirms a removed entry is not brought back into memory by the
///   stalled reader.
#[tokio::test]
async fn test_promotion_does_not_resurrect_removed_entry() {
    let (facade, store, reader) = stalled_read().await;

    assert!(facade.remove(Partition::ApiResponses, &derive_key_str("u")).await);
    store.release();
    assert_eq!(reader.await.unwrap(), Some(json!("v1")));

    assert_eq!(facade.memory().len().await, 0);
    assert_eq!(facade.get_cached_api_response("u").await, None);
}

/// Validates TTL expiry across both tiers for the 100ms entry scenario.
///
/// Assertions:
/// - Confirms the entry is served 50ms after insertion.
/// - Confirms neither tier serves it 150ms after insertion.
#[tokio::test]
async fn test_ttl_expiry_in_both_tiers() {
    let (facade, store, clock) = build(10);
    let ttl = Some(Duration::from_millis(100));
    facade.cache_api_response("https://example.test/ttl", &json!({"v": 1}), ttl).await;

    clock.advance_millis(50);
    assert_eq!(
        facade.get_cached_api_response("https://example.test/ttl").await,
        Some(json!({"v": 1}))
    );

    clock.advance_millis(100);
    assert_eq!(facade.get_cached_api_response("https://example.test/ttl").await, None);
    let key = derive_key_str("https://example.test/ttl");
    assert!(store.peek(Partition::ApiResponses, &key).is_none(), "stale row purged");
}

/// Validates strict LRU eviction for the capacity-two scenario.
///
/// Assertions:
/// - Confirms reading A protects it so inserting C evicts B.
/// - Confirms A and C remain in memory.
#[tokio::test]
async fn test_lru_evicts_least_recently_read() {
    let (facade, store, _) = build(2);
    facade.cache_api_response("a", &json!("A"), None).await;
    facade.cache_api_response("b", &json!("B"), None).await;
    assert!(facade.get_cached_api_response("a").await.is_some());
    facade.cache_api_response("c", &json!("C"), None).await;

    let gets_before = store.get_calls();
    assert_eq!(facade.get_cached_api_response("a").await, Some(json!("A")));
    assert_eq!(facade.get_cached_api_response("c").await, Some(json!("C")));
    assert_eq!(store.get_calls(), gets_before, "A and C served from memory");

    let stats = facade.stats().await;
    assert_eq!(stats.memory.size, 2);
    assert_eq!(stats.memory.evictions, 1);

    // B is gone from memory but still durable.
    assert_eq!(facade.get_cached_api_response("b").await, Some(json!("B")));
    assert_eq!(store.get_calls(), gets_before + 1);
}

/// Validates read promotion for the persistent-only entry scenario.
///
/// Assertions:
/// - Confirms a value present only in the persistent tier is returned.
/// - Confirms the next read does not touch the store.
#[tokio::test]
async fn test_persistent_hit_is_promoted() {
    let (facade, store, _) = build(10);
    facade.cache_image("https://example.test/logo.png", vec![1, 2, 3], Some("image/png".into()), None).await;
    facade.memory().clear().await;

    let image = facade.get_cached_image("https://example.test/logo.png").await.unwrap();
    assert_eq!(image.data, vec![1, 2, 3]);
    assert_eq!(image.content_type.as_deref(), Some("image/png"));
    let gets = store.get_calls();

    facade.get_cached_image("https://example.test/logo.png").await.unwrap();
    assert_eq!(store.get_calls(), gets);
}

/// Validates write resilience for the failing store scenario.
///
/// Assertions:
/// - Confirms the write completes although `put` fails.
/// - Confirms the value is served from memory afterwards.
#[tokio::test]
async fn test_write_survives_persistence_failure() {
    let (facade, store, _) = build(10);
    store.fail_puts(true);

    facade.cache_api_response("https://example.test/x", &json!([1, 2]), None).await;
    assert_eq!(store.put_calls(), 1);
    assert!(store.is_empty());
    assert_eq!(facade.get_cached_api_response("https://example.test/x").await, Some(json!([1, 2])));
}

/// Validates round trips for each content class.
///
/// Assertions:
/// - Confirms JSON, binary and component data come back unchanged after a
///   memory wipe.
/// - Confirms structurally equal component identifiers share a slot.
#[tokio::test]
async fn test_round_trip_every_content_class() {
    let (facade, _, _) = build(10);
    let blob: Vec<u8> = (0..=255).collect();

    facade.cache_api_response("https://example.test/api", &json!({"items": [1, 2, 3]}), None).await;
    facade.cache_image("https://example.test/img", blob.clone(), None, None).await;
    facade
        .cache_component_data(&json!({"name": "carousel", "page": 2}), json!({"index": 4}), None)
        .await
        .unwrap();
    facade.memory().clear().await;

    assert_eq!(
        facade.get_cached_api_response("https://example.test/api").await,
        Some(json!({"items": [1, 2, 3]}))
    );
    assert_eq!(facade.get_cached_image("https://example.test/img").await.unwrap().data, blob);
    assert_eq!(
        facade
            .get_cached_component_data(&json!({"page": 2, "name": "carousel"}))
            .await
            .unwrap(),
        Some(json!({"index": 4}))
    );
}

/// Validates memory-only operation for the unavailable store scenario.
///
/// Assertions:
/// - Confirms reads and writes keep working from memory.
/// - Confirms stats report the persistent tier as unavailable.
#[tokio::test]
async fn test_degrades_to_memory_only() {
    let (facade, store, _) = build(10);
    store.fail_open(true);

    facade.cache_api_response("u", &json!(1), None).await;
    assert_eq!(facade.get_cached_api_response("u").await, Some(json!(1)));
    facade.cache_api_response("v", &json!(2), None).await;

    let stats = facade.stats().await;
    assert_eq!(stats.persistent_available, Some(false));
    assert!(stats.persistent_counts.is_empty());
    assert_eq!(store.open_calls(), 1);
}
