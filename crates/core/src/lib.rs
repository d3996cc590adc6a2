//! # tiercache core
//!
//! Caching logic with no storage, HTTP or platform code.
//!
//! This crate contains:
//! - Key derivation for cache identifiers
//! - The persistent tier and the two-tier cache façade
//! - The cache-aware fetch service
//! - Port traits implemented by `tiercache-infra`, plus in-memory fakes
//!
//! ## Architecture Principles
//! - Depends only on `tiercache-common` and `tiercache-domain`
//! - All external effects go through the traits in [`ports`]

pub mod facade;
pub mod fetch;
pub mod keys;
pub mod persistent;
pub mod ports;
pub mod testing;

pub use facade::{CacheFacade, CachedImage, FacadeStats, MemoryTier, SweepReport};
pub use fetch::{FetchMetricsSnapshot, FetchService, FetchStats};
pub use keys::{derive_key, derive_key_str, request_identity, request_key};
pub use persistent::PersistentTier;
pub use ports::{ConnectivityProbe, HttpTransport, KeyValueStore};
