//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use tiercache_domain::{CacheError, NetworkError};
use tokio::task::JoinError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub CacheError);

impl From<InfraError> for CacheError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CacheError> for InfraError {
    fn from(value: CacheError) -> Self {
        InfraError(value)
    }
}

/// Maps a storage-layer failure onto the domain error.
trait IntoCacheError {
    fn into_cache_error(self) -> CacheError;
}

/// Maps a transport failure onto a single-attempt network error.
pub trait IntoNetworkError {
    fn into_network_error(self) -> NetworkError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → CacheError */
/* -------------------------------------------------------------------------- */

impl IntoCacheError for SqlError {
    fn into_cache_error(self) -> CacheError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match err.code {
                    ErrorCode::DatabaseBusy => CacheError::persistence("database is busy"),
                    ErrorCode::DatabaseLocked => CacheError::persistence("database is locked"),
                    ErrorCode::ReadOnly => CacheError::persistence("database is read-only"),
                    ErrorCode::DiskFull => CacheError::persistence("disk is full"),
                    ErrorCode::CannotOpen => {
                        CacheError::persistence(format!("unable to open database: {message}"))
                    }
                    ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt => {
                        CacheError::persistence("database file is corrupt or not a database")
                    }
                    _ => CacheError::persistence(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::FromSqlConversionFailure(_, _, cause) => {
                CacheError::persistence(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, name, ty) => {
                CacheError::persistence(format!("invalid column type for {name}: {ty}"))
            }
            RE::InvalidPath(path) => CacheError::persistence(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => CacheError::persistence(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_cache_error())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → CacheError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(CacheError::persistence(format!("connection pool: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → CacheError */
/* -------------------------------------------------------------------------- */

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(CacheError::persistence(format!("stored payload is malformed: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* tokio::task::JoinError → CacheError */
/* -------------------------------------------------------------------------- */

impl From<JoinError> for InfraError {
    fn from(value: JoinError) -> Self {
        InfraError(CacheError::internal(format!("blocking task failed: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → NetworkError */
/* -------------------------------------------------------------------------- */

impl IntoNetworkError for HttpError {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            return NetworkError::Timeout { after_ms: 0 };
        }

        if let Some(status) = self.status() {
            return NetworkError::Status { status: status.as_u16() };
        }

        if self.is_connect() {
            return NetworkError::Connection(format!("connection failure: {self}"));
        }

        NetworkError::Connection(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(CacheError::Network(value.into_network_error()))
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
