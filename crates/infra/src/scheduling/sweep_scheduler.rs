//! Periodic expiry sweep for both cache tiers.
//!
//! Expired entries are normally removed lazily on read; the sweep keeps
//! entries that are never read again from accumulating.

use std::sync::Arc;
use std::time::Duration;

use tiercache_core::CacheFacade;
use tiercache_domain::CacheSettings;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::error::SchedulerResult;
use super::task::ScheduledTask;

/// Configuration for the sweep scheduler
#[derive(Debug, Clone)]
pub struct SweepSchedulerConfig {
    /// Time between sweeps
    pub interval: Duration,
}

impl Default for SweepSchedulerConfig {
    fn default() -> Self {
        Self { interval: tiercache_domain::constants::DEFAULT_SWEEP_INTERVAL }
    }
}

impl From<&CacheSettings> for SweepSchedulerConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self { interval: settings.sweep_interval }
    }
}

/// Runs [`CacheFacade::clear_expired`] every `interval`.
pub struct SweepScheduler {
    facade: Arc<CacheFacade>,
    config: SweepSchedulerConfig,
    task: ScheduledTask,
}

impl SweepScheduler {
    pub fn new(facade: Arc<CacheFacade>, config: SweepSchedulerConfig) -> Self {
        Self { facade, config, task: ScheduledTask::default() }
    }

    /// Start the scheduler
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is already running
    #[instrument(skip(self), fields(interval = ?self.config.interval))]
    pub async fn start(&self) -> SchedulerResult<()> {
        let facade = Arc::clone(&self.facade);
        let interval = self.config.interval;
        self.task.start(move |cancel| Self::sweep_loop(facade, interval, cancel)).await?;
        info!("Sweep scheduler started");
        Ok(())
    }

    /// Stop the scheduler gracefully
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is not running
    #[instrument(skip(self))]
    pub async fn stop(&self) -> SchedulerResult<()> {
        self.task.stop().await?;
        info!("Sweep scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    async fn sweep_loop(facade: Arc<CacheFacade>, interval: Duration, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Sweep loop cancelled");
                    break;
                }
                () = tokio::time::sleep(interval) => {
                    let report = facade.clear_expired().await;
                    if report.total() > 0 {
                        info!(
                            memory_removed = report.memory_removed,
                            persistent_removed = report.persistent_removed,
                            "Expired entries swept"
                        );
                    } else {
                        debug!("Sweep found nothing to remove");
                    }
                }
            }
        }
    }
}
