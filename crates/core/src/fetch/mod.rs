//! Network fetch wrapper
//!
//! [`FetchService`] sits in front of an [`HttpTransport`](crate::ports::HttpTransport)
//! and runs each request through cache lookup, request coalescing, timeout
//! and retry, write-back and offline fallback. Batch, prefetch and
//! background-sync helpers are built on the same path.

mod background;
mod coalescing;
pub mod metrics;
mod service;

pub use metrics::{FetchMetrics, FetchMetricsSnapshot};
pub use service::{FetchService, FetchStats};
