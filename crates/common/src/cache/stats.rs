//! Cache statistics and metrics tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Current number of entries
    pub size: usize,

    /// Maximum allowed entries (None = unlimited)
    pub max_size: Option<usize>,

    /// Approximate bytes held by live entries
    pub approx_bytes: usize,

    /// Soft byte budget (None = untracked)
    pub max_bytes: Option<usize>,

    /// Total number of successful get operations
    pub hits: u64,

    /// Total number of failed get operations (key not found or expired)
    pub misses: u64,

    /// Total number of insert operations
    pub inserts: u64,

    /// Total number of entries evicted to make room
    pub evictions: u64,

    /// Total number of expired entries removed
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate hit rate (hits / total accesses)
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate fill percentage (size / max_size)
    pub fn fill_percentage(&self) -> Option<f64> {
        self.max_size.map(|max| if max == 0 { 0.0 } else { self.size as f64 / max as f64 })
    }

    /// Whether the approximate byte count exceeds the soft budget
    pub fn over_byte_budget(&self) -> bool {
        self.max_bytes.is_some_and(|max| self.approx_bytes > max)
    }

    /// Total number of access operations (hits + misses)
    pub fn total_accesses(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Lock-free counters backing [`CacheStats`]
#[derive(Debug, Clone, Default)]
pub(crate) struct MetricsCollector {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    inserts: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
    expirations: Arc<AtomicU64>,
}

impl MetricsCollector {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expirations(&self, count: usize) {
        self.expirations.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(
        &self,
        size: usize,
        approx_bytes: usize,
        max_size: Option<usize>,
        max_bytes: Option<usize>,
    ) -> CacheStats {
        CacheStats {
            size,
            max_size,
            approx_bytes,
            max_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}
