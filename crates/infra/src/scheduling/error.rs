//! Scheduler error types

use std::time::Duration;

use thiserror::Error;
use tiercache_domain::CacheError;

use crate::errors::InfraError;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Scheduler is already running
    #[error("Scheduler already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler not running")]
    NotRunning,

    /// Operation timed out
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        duration: Duration,
        #[source]
        source: tokio::time::error::Elapsed,
    },

    /// Task join failed
    #[error("Task join failed: {0}")]
    TaskJoinFailed(#[from] tokio::task::JoinError),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        InfraError(CacheError::internal(err.to_string()))
    }
}

impl From<SchedulerError> for CacheError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
