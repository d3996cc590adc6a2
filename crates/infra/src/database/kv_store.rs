//! SQLite-backed implementation of the [`KeyValueStore`] port.
//!
//! Rows live in `cache_entries`, keyed by `(partition, key)`. All statements
//! run on the blocking pool; the async methods only hop threads.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tiercache_core::KeyValueStore;
use tiercache_domain::{CacheError, CachedValue, Partition, Result, StorageSettings, StoredEntry};
use tokio::task;
use tracing::{debug, info};

use super::manager::{map_sql_error, DbManager};
use crate::errors::InfraError;

const UPSERT_SQL: &str = "INSERT OR REPLACE INTO cache_entries
        (partition, key, content_class, content_type, payload, stored_at_ms, ttl_ms, version)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const SELECT_COLUMNS: &str =
    "partition, key, content_class, content_type, payload, stored_at_ms, ttl_ms, version";

/// Persistent store over a pooled SQLite database.
///
/// The database is opened by [`KeyValueStore::open`]; every other call fails
/// with `PersistenceUnavailable` until then, and again after `close`.
pub struct SqliteKeyValueStore {
    settings: StorageSettings,
    db: RwLock<Option<Arc<DbManager>>>,
}

impl SqliteKeyValueStore {
    pub fn new(settings: StorageSettings) -> Self {
        Self { settings, db: RwLock::new(None) }
    }

    /// The underlying manager, once opened.
    pub fn manager(&self) -> Option<Arc<DbManager>> {
        self.db.read().clone()
    }

    fn db(&self) -> Result<Arc<DbManager>> {
        self.manager().ok_or_else(|| CacheError::persistence("sqlite store is not open"))
    }

    /// Runs `op` with a pooled connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = self.db()?;
        task::spawn_blocking(move || -> Result<T> {
            let conn = db.get_connection()?;
            op(&conn)
        })
        .await
        .map_err(|e| CacheError::from(InfraError::from(e)))?
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn open(&self) -> Result<()> {
        if self.manager().is_some() {
            return Ok(());
        }

        let settings = self.settings.clone();
        let manager = task::spawn_blocking(move || -> Result<DbManager> {
            let manager = DbManager::new(&settings)?;
            manager.run_migrations()?;
            Ok(manager)
        })
        .await
        .map_err(|e| CacheError::from(InfraError::from(e)))??;

        info!(db_path = %manager.path().display(), "sqlite store opened");
        *self.db.write() = Some(Arc::new(manager));
        Ok(())
    }

    async fn put(&self, entry: StoredEntry) -> Result<()> {
        self.with_conn(move |conn| insert_entry(conn, &entry)).await
    }

    async fn get(&self, partition: Partition, key: &str) -> Result<Option<StoredEntry>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {SELECT_COLUMNS} FROM cache_entries WHERE partition = ?1 AND key = ?2"
            );
            let raw = conn
                .query_row(&sql, params![partition.as_str(), key], RawRow::from_row)
                .optional()
                .map_err(map_sql_error)?;
            raw.map(RawRow::into_entry).transpose()
        })
        .await
    }

    async fn delete(&self, partition: Partition, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM cache_entries WHERE partition = ?1 AND key = ?2",
                    params![partition.as_str(), key],
                )
                .map_err(map_sql_error)?;
            Ok(removed > 0)
        })
        .await
    }

    async fn delete_expired(
        &self,
        partition: Partition,
        now_ms: i64,
        version: u32,
    ) -> Result<usize> {
        let removed = self
            .with_conn(move |conn| {
                conn.execute(
                    "DELETE FROM cache_entries
                     WHERE partition = ?1 AND (version != ?3 OR ?2 - stored_at_ms > ttl_ms)",
                    params![partition.as_str(), now_ms, version],
                )
                .map_err(map_sql_error)
            })
            .await?;
        if removed > 0 {
            debug!(%partition, removed, "expired rows deleted");
        }
        Ok(removed)
    }

    async fn entries(&self, partition: Partition) -> Result<Vec<StoredEntry>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {SELECT_COLUMNS} FROM cache_entries WHERE partition = ?1 ORDER BY stored_at_ms"
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![partition.as_str()], RawRow::from_row)
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;
            rows.into_iter().map(RawRow::into_entry).collect()
        })
        .await
    }

    async fn count(&self, partition: Partition) -> Result<usize> {
        self.with_conn(move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE partition = ?1",
                    params![partition.as_str()],
                    |row| row.get(0),
                )
                .map_err(map_sql_error)?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
    }

    async fn clear(&self, partition: Partition) -> Result<usize> {
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM cache_entries WHERE partition = ?1",
                params![partition.as_str()],
            )
            .map_err(map_sql_error)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        if let Some(db) = self.db.write().take() {
            debug!(db_path = %db.path().display(), "sqlite store closed");
        }
        Ok(())
    }
}

fn insert_entry(conn: &Connection, entry: &StoredEntry) -> Result<()> {
    let (content_type, payload) = encode_value(&entry.value)?;
    conn.execute(
        UPSERT_SQL,
        params![
            entry.partition.as_str(),
            entry.key,
            entry.value.content_class(),
            content_type,
            payload,
            entry.stored_at_ms,
            i64::try_from(entry.ttl_ms).unwrap_or(i64::MAX),
            entry.version,
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn encode_value(value: &CachedValue) -> Result<(Option<&str>, Vec<u8>)> {
    match value {
        CachedValue::Json { value } | CachedValue::Opaque { value } => {
            let bytes = serde_json::to_vec(value).map_err(InfraError::from)?;
            Ok((None, bytes))
        }
        CachedValue::Binary { content_type, data } => Ok((content_type.as_deref(), data.clone())),
    }
}

/// Column values as read, before decoding into domain types.
struct RawRow {
    partition: String,
    key: String,
    content_class: String,
    content_type: Option<String>,
    payload: Vec<u8>,
    stored_at_ms: i64,
    ttl_ms: i64,
    version: u32,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            partition: row.get(0)?,
            key: row.get(1)?,
            content_class: row.get(2)?,
            content_type: row.get(3)?,
            payload: row.get(4)?,
            stored_at_ms: row.get(5)?,
            ttl_ms: row.get(6)?,
            version: row.get(7)?,
        })
    }

    fn into_entry(self) -> Result<StoredEntry> {
        let partition = Partition::parse(&self.partition).ok_or_else(|| {
            CacheError::persistence(format!("unknown partition in store: {}", self.partition))
        })?;
        let value = match self.content_class.as_str() {
            "json" => CachedValue::json(
                serde_json::from_slice(&self.payload).map_err(InfraError::from)?,
            ),
            "opaque" => CachedValue::opaque(
                serde_json::from_slice(&self.payload).map_err(InfraError::from)?,
            ),
            "binary" => CachedValue::binary(self.payload, self.content_type),
            other => {
                return Err(CacheError::persistence(format!("unknown content class: {other}")))
            }
        };
        Ok(StoredEntry {
            partition,
            key: self.key,
            value,
            stored_at_ms: self.stored_at_ms,
            ttl_ms: u64::try_from(self.ttl_ms).unwrap_or(0),
            version: self.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn entry(partition: Partition, key: &str, value: CachedValue, stored_at_ms: i64) -> StoredEntry {
        StoredEntry {
            partition,
            key: key.into(),
            value,
            stored_at_ms,
            ttl_ms: 1_000,
            version: 1,
        }
    }

    async fn open_store() -> (SqliteKeyValueStore, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let store = SqliteKeyValueStore::new(StorageSettings {
            path: temp_dir.path().join("cache.db"),
            ..StorageSettings::default()
        });
        store.open().await.expect("store opens");
        (store, temp_dir)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn calls_before_open_are_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteKeyValueStore::new(StorageSettings {
            path: temp_dir.path().join("cache.db"),
            ..StorageSettings::default()
        });

        let err = store.count(Partition::Images).await.unwrap_err();
        assert!(matches!(err, CacheError::PersistenceUnavailable(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn every_content_class_round_trips() {
        let (store, _dir) = open_store().await;
        let values = [
            (Partition::ApiResponses, CachedValue::json(json!({"items": [1, 2]}))),
            (Partition::Images, CachedValue::binary(vec![0, 255, 7], Some("image/png".into()))),
            (Partition::Components, CachedValue::opaque(json!({"index": 3}))),
        ];

        for (partition, value) in &values {
            store.put(entry(*partition, "k", value.clone(), 10)).await.unwrap();
        }
        for (partition, value) in values {
            let stored = store.get(partition, "k").await.unwrap().expect("row present");
            assert_eq!(stored.value, value);
            assert_eq!(stored.stored_at_ms, 10);
            assert_eq!(stored.ttl_ms, 1_000);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn put_replaces_existing_key() {
        let (store, _dir) = open_store().await;
        store.put(entry(Partition::ApiResponses, "k", CachedValue::json(json!(1)), 0)).await.unwrap();
        store.put(entry(Partition::ApiResponses, "k", CachedValue::json(json!(2)), 5)).await.unwrap();

        assert_eq!(store.count(Partition::ApiResponses).await.unwrap(), 1);
        let stored = store.get(Partition::ApiResponses, "k").await.unwrap().unwrap();
        assert_eq!(stored.value, CachedValue::json(json!(2)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn partitions_are_isolated() {
        let (store, _dir) = open_store().await;
        store.put(entry(Partition::ApiResponses, "k", CachedValue::json(json!(1)), 0)).await.unwrap();

        assert!(store.get(Partition::Components, "k").await.unwrap().is_none());
        assert_eq!(store.clear(Partition::Components).await.unwrap(), 0);
        assert_eq!(store.clear(Partition::ApiResponses).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_expired_removes_stale_and_foreign_versions() {
        let (store, _dir) = open_store().await;
        let fresh = entry(Partition::ApiResponses, "fresh", CachedValue::json(json!(1)), 5_000);
        let stale = entry(Partition::ApiResponses, "stale", CachedValue::json(json!(2)), 0);
        let mut old_version =
            entry(Partition::ApiResponses, "old", CachedValue::json(json!(3)), 5_000);
        old_version.version = 0;
        for e in [fresh, stale, old_version] {
            store.put(e).await.unwrap();
        }

        let removed = store.delete_expired(Partition::ApiResponses, 5_500, 1).await.unwrap();
        assert_eq!(removed, 2);
        let keys: Vec<_> = store
            .entries(Partition::ApiResponses)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["fresh".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_makes_store_unavailable() {
        let (store, _dir) = open_store().await;
        assert!(!store.delete(Partition::Images, "missing").await.unwrap());

        store.close().await.unwrap();
        assert!(store.get(Partition::Images, "k").await.is_err());
    }
}
