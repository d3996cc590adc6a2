//! Domain constants
//!
//! Defaults used when configuration leaves a value unset.

use std::time::Duration;

// Cache tiers
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const CACHE_VERSION: u32 = 1;
pub const DEFAULT_MAX_MEMORY_ITEMS: usize = 100;
pub const DEFAULT_MAX_MEMORY_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

// Fetch wrapper
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_PREFETCH_CONCURRENCY: usize = 2;
pub const DEFAULT_USER_AGENT: &str = concat!("tiercache/", env!("CARGO_PKG_VERSION"));

// Background request queue
pub const DEFAULT_BACKGROUND_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKGROUND_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_REPLAY_INTERVAL: Duration = Duration::from_secs(5 * 60);

// Storage
pub const DEFAULT_DB_PATH: &str = "tiercache.db";
pub const DEFAULT_DB_POOL_SIZE: u32 = 4;
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// Response marker header
pub const CACHE_STATUS_HEADER: &str = "x-cache";
pub const CACHE_STATUS_HIT: &str = "HIT";
pub const CACHE_STATUS_MISS: &str = "MISS";
pub const CACHE_STATUS_OFFLINE: &str = "OFFLINE";
