//! Error types used throughout tiercache

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tiercache_common::error::{ErrorClassification, ErrorSeverity};

/// Failure of a single network exchange or of a whole retry sequence.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum NetworkError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("server responded with HTTP {status}")]
    Status { status: u16 },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<NetworkError> },
}

impl NetworkError {
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout { after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX) }
    }

    /// Statuses worth retrying: server errors, request timeout, rate limit.
    pub fn is_retryable_status(status: u16) -> bool {
        status >= 500 || status == 408 || status == 429
    }

    /// The error from the final attempt, unwrapping `Exhausted`.
    pub fn root(&self) -> &Self {
        match self {
            Self::Exhausted { last, .. } => last.root(),
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Self::Timeout { .. })
    }
}

impl ErrorClassification for NetworkError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout { .. } => true,
            Self::Status { status } => Self::is_retryable_status(*status),
            Self::Exhausted { .. } => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(_) | Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::Status { .. } | Self::Exhausted { .. } => ErrorSeverity::Error,
        }
    }
}

/// Main error type for tiercache
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CacheError {
    #[error("Invalid key input: {0}")]
    InvalidKeyInput(String),

    #[error("Persistent storage unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceUnavailable(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The network failure behind this error, if any.
    pub fn as_network(&self) -> Option<&NetworkError> {
        match self {
            Self::Network(error) => Some(error),
            _ => None,
        }
    }

    /// Short label for structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidKeyInput(_) => "invalid_key_input",
            Self::PersistenceUnavailable(_) => "persistence_unavailable",
            Self::Network(NetworkError::Timeout { .. }) => "timeout",
            Self::Network(_) => "network",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}

impl ErrorClassification for CacheError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network(error) => error.is_retryable(),
            Self::PersistenceUnavailable(_) => true,
            Self::InvalidKeyInput(_)
            | Self::InvalidRequest(_)
            | Self::Config(_)
            | Self::Internal(_) => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::PersistenceUnavailable(_) => ErrorSeverity::Warning,
            Self::Network(error) => error.severity(),
            Self::InvalidKeyInput(_) | Self::InvalidRequest(_) | Self::Config(_) => {
                ErrorSeverity::Error
            }
            Self::Internal(_) => ErrorSeverity::Critical,
        }
    }
}

/// Result type alias for tiercache operations
pub type Result<T> = std::result::Result<T, CacheError>;
