//! Modular common utilities shared across tiercache crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error classification, serde helpers
//! - `runtime`: async infrastructure (cache, resilience, lifecycle)
//! - `observability`: tracing (pulled in by `runtime`)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod cache;
#[cfg(feature = "runtime")]
pub mod lifecycle;
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use cache::{AsyncCache, CacheConfig, CacheConfigBuilder, CacheStats};
#[cfg(feature = "foundation")]
pub use error::{ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use lifecycle::{ComponentHealth, Lifecycle, ManagerHealth, ManagerStatus, StatusCell};
#[cfg(feature = "runtime")]
pub use resilience::{
    BackoffStrategy, Clock, MockClock, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryOutcome, RetryPolicy, RetryResult, SharedClock, SystemClock,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
