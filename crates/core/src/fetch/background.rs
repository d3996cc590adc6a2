//! Background request queue
//!
//! Requests that fail under `fetch_with_background_sync` are stored in the
//! `backgroundRequests` partition of the persistent tier and replayed later.
//! The queue lives only in the persistent tier; when that tier is
//! unavailable, queued requests are dropped with a warning.

use tiercache_domain::{
    CacheError, CacheMode, CachedValue, FetchOptions, Partition, QueuedRequest, ReplaySummary,
    Result, StoredEntry, SyncOutcome,
};
use tracing::{debug, info, instrument, warn};

use super::service::{FetchInner, FetchService};

impl FetchService {
    /// Fetches `url`; on a network failure the request is queued for replay
    /// and `Queued` is returned. The queue write happens in the background.
    pub async fn fetch_with_background_sync(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> Result<SyncOutcome> {
        let request = options.to_request(url);
        match self.fetch(url, options).await {
            Ok(response) => Ok(SyncOutcome::Delivered(response)),
            Err(error @ CacheError::Network(_)) => {
                let queued = QueuedRequest::new(request, self.inner.clock.millis_since_epoch());
                let request_id = queued.id;
                self.inner.metrics.record_background_queued();

                let inner = self.inner.clone();
                tokio::spawn(async move {
                    if let Err(err) = inner.enqueue(&queued).await {
                        warn!(error = %err, id = %queued.id, "failed to queue background request");
                    }
                });

                debug!(url, %request_id, "request queued for background sync");
                Ok(SyncOutcome::Queued { request_id, error })
            }
            Err(other) => Err(other),
        }
    }

    /// Replays every queued request once. Successful requests are removed;
    /// failures count an attempt and are dropped after
    /// `background_max_attempts`. Does nothing while offline.
    #[instrument(skip(self))]
    pub async fn replay_background_queue(&self) -> Result<ReplaySummary> {
        let persistent = self.inner.facade.persistent();
        let entries = persistent.entries(Partition::BackgroundRequests).await?;

        let mut summary = ReplaySummary::default();
        if !self.is_online() {
            summary.remaining = entries.len();
            debug!(queued = summary.remaining, "offline; replay deferred");
            return Ok(summary);
        }

        for entry in entries {
            let Some(mut queued) = decode(&entry) else {
                warn!(key = %entry.key, "dropping undecodable queued request");
                persistent.delete(Partition::BackgroundRequests, &entry.key).await?;
                summary.dropped += 1;
                continue;
            };

            let options = FetchOptions {
                method: queued.request.method,
                headers: queued.request.headers.clone(),
                body: queued.request.body.clone(),
                cache: CacheMode::NoCache,
                ..FetchOptions::default()
            };

            match self.fetch_inner(&queued.request.url, options, false).await {
                Ok(_) => {
                    persistent.delete(Partition::BackgroundRequests, &entry.key).await?;
                    summary.replayed += 1;
                }
                Err(err) => {
                    queued.attempts += 1;
                    queued.last_error = Some(err.to_string());
                    if queued.attempts >= self.inner.settings.background_max_attempts {
                        warn!(id = %queued.id, attempts = queued.attempts, error = %err, "giving up on queued request");
                        persistent.delete(Partition::BackgroundRequests, &entry.key).await?;
                        summary.dropped += 1;
                    } else {
                        let remaining = entry.remaining_ttl(self.inner.clock.millis_since_epoch());
                        persistent
                            .put(Partition::BackgroundRequests, &entry.key, encode(&queued)?, remaining)
                            .await?;
                        summary.failed += 1;
                        summary.remaining += 1;
                    }
                }
            }
        }

        if summary.replayed + summary.dropped > 0 {
            info!(
                replayed = summary.replayed,
                failed = summary.failed,
                dropped = summary.dropped,
                "background queue replayed"
            );
        }
        Ok(summary)
    }

    /// Requests currently waiting for replay.
    pub async fn queued_requests(&self) -> Result<Vec<QueuedRequest>> {
        let entries =
            self.inner.facade.persistent().entries(Partition::BackgroundRequests).await?;
        Ok(entries.iter().filter_map(decode).collect())
    }
}

impl FetchInner {
    async fn enqueue(&self, queued: &QueuedRequest) -> Result<()> {
        self.facade
            .persistent()
            .put(
                Partition::BackgroundRequests,
                &queued.id.to_string(),
                encode(queued)?,
                self.settings.background_ttl,
            )
            .await
    }
}

fn encode(queued: &QueuedRequest) -> Result<CachedValue> {
    serde_json::to_value(queued)
        .map(CachedValue::opaque)
        .map_err(|e| CacheError::internal(format!("failed to encode queued request: {e}")))
}

fn decode(entry: &StoredEntry) -> Option<QueuedRequest> {
    match &entry.value {
        CachedValue::Opaque { value } => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}
