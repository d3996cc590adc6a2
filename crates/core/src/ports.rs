//! Port interfaces for the cache tiers and the fetch wrapper
//!
//! These traits define the boundaries between core caching logic and the
//! infrastructure that stores bytes, talks to the network and watches
//! connectivity.

use async_trait::async_trait;
use tiercache_domain::{HttpRequest, HttpResponse, NetworkError, Partition, Result, StoredEntry};

/// Durable partitioned key/value storage backing the persistent tier.
///
/// Implementations report failures as [`tiercache_domain::CacheError::PersistenceUnavailable`].
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Prepare the store (create schema, open connections). Called once.
    async fn open(&self) -> Result<()>;

    /// Insert or replace the entry at `(entry.partition, entry.key)`.
    async fn put(&self, entry: StoredEntry) -> Result<()>;

    /// Raw lookup; performs no expiry or version checks.
    async fn get(&self, partition: Partition, key: &str) -> Result<Option<StoredEntry>>;

    /// Delete one entry, returning whether it existed.
    async fn delete(&self, partition: Partition, key: &str) -> Result<bool>;

    /// Delete entries expired at `now_ms` or written under another version.
    async fn delete_expired(&self, partition: Partition, now_ms: i64, version: u32)
        -> Result<usize>;

    /// All raw entries of a partition.
    async fn entries(&self, partition: Partition) -> Result<Vec<StoredEntry>>;

    /// Number of rows currently stored in a partition.
    async fn count(&self, partition: Partition) -> Result<usize>;

    /// Remove every entry of a partition.
    async fn clear(&self, partition: Partition) -> Result<usize>;

    /// Release resources. Later calls may fail.
    async fn close(&self) -> Result<()>;
}

/// Reports whether the host currently has network connectivity.
pub trait ConnectivityProbe: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Performs exactly one physical network exchange.
///
/// Non-2xx responses are returned as `Ok`; the caller decides what a status
/// means. Timeouts and retries are handled above this layer.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, NetworkError>;
}
