//! Fetch-level counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Lock-free counters updated on every fetch.
#[derive(Debug, Default)]
pub struct FetchMetrics {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    network_calls: AtomicU64,
    coalesced: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
    offline_fallbacks: AtomicU64,
    background_queued: AtomicU64,
    network_latency_ms: AtomicU64,
}

impl FetchMetrics {
    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_network_call(&self, latency: Duration) {
        self.network_calls.fetch_add(1, Ordering::Relaxed);
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.network_latency_ms.fetch_add(millis, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retries(&self, retries: u32) {
        self.retries.fetch_add(u64::from(retries), Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_offline_fallback(&self) {
        self.offline_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_background_queued(&self) {
        self.background_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FetchMetricsSnapshot {
        let network_calls = self.network_calls.load(Ordering::Relaxed);
        let latency = self.network_latency_ms.load(Ordering::Relaxed);
        FetchMetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            network_calls,
            coalesced: self.coalesced.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            offline_fallbacks: self.offline_fallbacks.load(Ordering::Relaxed),
            background_queued: self.background_queued.load(Ordering::Relaxed),
            avg_network_latency_ms: latency.checked_div(network_calls).unwrap_or(0),
        }
    }
}

/// Point-in-time copy of [`FetchMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchMetricsSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    /// Physical transport calls, one per attempt
    pub network_calls: u64,
    /// Callers that joined an in-flight request instead of starting one
    pub coalesced: u64,
    pub retries: u64,
    pub failures: u64,
    pub offline_fallbacks: u64,
    pub background_queued: u64,
    pub avg_network_latency_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_latency_ignores_empty_history() {
        let metrics = FetchMetrics::default();
        assert_eq!(metrics.snapshot().avg_network_latency_ms, 0);

        metrics.record_network_call(Duration::from_millis(30));
        metrics.record_network_call(Duration::from_millis(10));
        metrics.record_retries(2);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.network_calls, 2);
        assert_eq!(snapshot.avg_network_latency_ms, 20);
        assert_eq!(snapshot.retries, 2);
    }
}
