//! Configuration types for tiercache
//!
//! Durations are written as millisecond counts or unit strings
//! (`"10s"`, `"24h"`) in config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tiercache_common::duration_millis;

use crate::constants::*;
use crate::errors::{CacheError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheSettings,
    pub fetch: FetchSettings,
    pub storage: StorageSettings,
}

impl Config {
    /// Checks every section, returning the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.fetch.validate()?;
        self.storage.validate()
    }
}

/// Cache tier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Memory tier capacity (entry count)
    pub max_memory_items: usize,
    /// Reported against the approximate memory footprint; not enforced
    pub max_memory_size_bytes: usize,
    #[serde(with = "duration_millis")]
    pub default_ttl: Duration,
    pub cache_version: u32,
    #[serde(with = "duration_millis")]
    pub sweep_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_memory_items: DEFAULT_MAX_MEMORY_ITEMS,
            max_memory_size_bytes: DEFAULT_MAX_MEMORY_BYTES,
            default_ttl: DEFAULT_TTL,
            cache_version: CACHE_VERSION,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl CacheSettings {
    fn validate(&self) -> Result<()> {
        if self.max_memory_items == 0 {
            return Err(CacheError::Config("cache.max_memory_items must be at least 1".into()));
        }
        if self.default_ttl.is_zero() {
            return Err(CacheError::Config("cache.default_ttl must be non-zero".into()));
        }
        if self.sweep_interval.is_zero() {
            return Err(CacheError::Config("cache.sweep_interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// Network fetch wrapper settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Total attempts including the first
    pub retry_attempts: u32,
    #[serde(with = "duration_millis")]
    pub retry_delay: Duration,
    #[serde(with = "duration_millis")]
    pub max_retry_delay: Duration,
    pub offline_fallback: bool,
    pub prefetch_concurrency: usize,
    pub background_max_attempts: u32,
    #[serde(with = "duration_millis")]
    pub background_ttl: Duration,
    #[serde(with = "duration_millis")]
    pub replay_interval: Duration,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            offline_fallback: true,
            prefetch_concurrency: DEFAULT_PREFETCH_CONCURRENCY,
            background_max_attempts: DEFAULT_BACKGROUND_MAX_ATTEMPTS,
            background_ttl: DEFAULT_BACKGROUND_TTL,
            replay_interval: DEFAULT_REPLAY_INTERVAL,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchSettings {
    fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(CacheError::Config("fetch.timeout must be non-zero".into()));
        }
        if self.retry_attempts == 0 {
            return Err(CacheError::Config("fetch.retry_attempts must be at least 1".into()));
        }
        if self.max_retry_delay < self.retry_delay {
            return Err(CacheError::Config(
                "fetch.max_retry_delay must not be shorter than fetch.retry_delay".into(),
            ));
        }
        if self.prefetch_concurrency == 0 {
            return Err(CacheError::Config("fetch.prefetch_concurrency must be at least 1".into()));
        }
        if self.background_max_attempts == 0 {
            return Err(CacheError::Config(
                "fetch.background_max_attempts must be at least 1".into(),
            ));
        }
        if self.replay_interval.is_zero() {
            return Err(CacheError::Config("fetch.replay_interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// SQLite storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub path: PathBuf,
    pub pool_size: u32,
    #[serde(with = "duration_millis")]
    pub busy_timeout: Duration,
    pub enable_wal: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
            pool_size: DEFAULT_DB_POOL_SIZE,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            enable_wal: true,
        }
    }
}

impl StorageSettings {
    fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(CacheError::Config("storage.pool_size must be at least 1".into()));
        }
        if self.path.as_os_str().is_empty() {
            return Err(CacheError::Config("storage.path must not be empty".into()));
        }
        Ok(())
    }
}
