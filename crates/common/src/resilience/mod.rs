//! Resilience patterns for fault tolerance
//!
//! - **[`clock`]**: monotonic and wall-clock time behind a trait so expiry and
//!   backoff logic can be tested deterministically
//! - **[`retry`]**: retry executor with exponential backoff and pluggable
//!   retry policies

pub mod clock;
pub mod retry;

pub use clock::{Clock, MockClock, SharedClock, SystemClock};
pub use retry::{
    policies, BackoffStrategy, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryOutcome, RetryPolicy, RetryResult,
};
