//! In-memory cache tier with TTL expiry and LRU eviction
//!
//! [`AsyncCache`] is the bounded, process-local tier: every entry carries its
//! own TTL (defaulting to [`CacheConfig::ttl`]), capacity is enforced by
//! evicting the least recently used entry, and approximate memory use is
//! reported through [`CacheStats`] when a weigher is configured.
//!
//! The expiry rules are exposed as plain functions ([`is_expired`],
//! [`evict_expired`]) so they can be tested without a runtime.
//!
//! ```
//! use std::time::Duration;
//!
//! use tiercache_common::cache::{AsyncCache, CacheConfig};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = CacheConfig::builder().max_size(2).ttl(Duration::from_secs(300)).build();
//! let cache: AsyncCache<&'static str, u32> = AsyncCache::new(config);
//!
//! cache.insert("a", 1).await;
//! cache.insert("b", 2).await;
//! cache.get(&"a").await;
//! cache.insert("c", 3).await; // evicts "b"
//!
//! assert!(cache.contains_key(&"a").await);
//! assert!(!cache.contains_key(&"b").await);
//! # }
//! ```

mod async_core;
mod config;
mod stats;

pub use async_core::{evict_expired, is_expired, AsyncCache, CacheEntry, CacheStorage};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use stats::CacheStats;
