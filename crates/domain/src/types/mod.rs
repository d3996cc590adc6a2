//! Domain types and models

pub mod entry;
pub mod fetch;
pub mod http;

pub use entry::{is_expired, CachedValue, Partition, StoredEntry, TierKey};
pub use fetch::{
    BatchItem, CacheMode, FetchOptions, FetchResponse, QueuedRequest, ReplaySummary,
    ResponseSource, SyncOutcome,
};
pub use http::{Headers, HttpMethod, HttpRequest, HttpResponse};
