//! Error classification shared by every tiercache error type.
//!
//! Crates define their own `thiserror` enums and implement
//! [`ErrorClassification`] so retry loops, logging and health reporting can
//! treat them uniformly:
//!
//! - **`is_retryable()`**: can the failed operation be attempted again?
//! - **`severity()`**: Info/Warning/Error/Critical for log levels and health
//! - **`is_critical()`**: does this need immediate attention?
//! - **`retry_after()`**: suggested delay before retrying, if any
//!
//! | Level | Use Case | Examples |
//! |-------|----------|----------|
//! | **Info** | Expected conditions | cache miss surfaced as error, offline |
//! | **Warning** | Degraded but operational | persistence unavailable, timeouts |
//! | **Error** | Failure requiring attention | exhausted retries, bad input |
//! | **Critical** | System integrity at risk | internal invariant violations |

use std::fmt;
use std::time::Duration;

/// Error classification trait for consistent error handling across modules
///
/// # Example
///
/// ```rust,ignore
/// use tiercache_common::error::{ErrorClassification, ErrorSeverity};
///
/// impl ErrorClassification for StoreError {
///     fn is_retryable(&self) -> bool {
///         matches!(self, Self::Busy(_))
///     }
///
///     fn severity(&self) -> ErrorSeverity {
///         match self {
///             Self::Busy(_) => ErrorSeverity::Warning,
///             Self::Corrupt(_) => ErrorSeverity::Critical,
///         }
///     }
///
///     fn is_critical(&self) -> bool {
///         self.severity() == ErrorSeverity::Critical
///     }
///
///     fn retry_after(&self) -> Option<Duration> {
///         None
///     }
/// }
/// ```
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient issues that may succeed if attempted
    /// again, such as network timeouts, dropped connections or a busy
    /// database.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    ///
    /// Used for monitoring, alerting, and logging decisions.
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Get the suggested retry delay if applicable
    ///
    /// Returns `Some(Duration)` when a specific delay is recommended (e.g.
    /// from a `Retry-After` header), or `None` to use the caller's backoff.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
