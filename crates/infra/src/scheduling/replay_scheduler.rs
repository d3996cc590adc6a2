//! Replay of queued background requests.
//!
//! Runs [`FetchService::replay_background_queue`] every `interval` and as
//! soon as the connectivity flag flips back to online.

use std::time::Duration;

use tiercache_core::FetchService;
use tiercache_domain::FetchSettings;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::error::SchedulerResult;
use super::task::ScheduledTask;

/// Configuration for the replay scheduler
#[derive(Debug, Clone)]
pub struct ReplaySchedulerConfig {
    /// Time between replay passes
    pub interval: Duration,
}

impl Default for ReplaySchedulerConfig {
    fn default() -> Self {
        Self { interval: tiercache_domain::constants::DEFAULT_REPLAY_INTERVAL }
    }
}

impl From<&FetchSettings> for ReplaySchedulerConfig {
    fn from(settings: &FetchSettings) -> Self {
        Self { interval: settings.replay_interval }
    }
}

pub struct ReplayScheduler {
    service: FetchService,
    connectivity: Option<watch::Receiver<bool>>,
    config: ReplaySchedulerConfig,
    task: ScheduledTask,
}

impl ReplayScheduler {
    /// `connectivity`, when given, triggers an extra pass on every
    /// offline-to-online transition.
    pub fn new(
        service: FetchService,
        connectivity: Option<watch::Receiver<bool>>,
        config: ReplaySchedulerConfig,
    ) -> Self {
        Self { service, connectivity, config, task: ScheduledTask::default() }
    }

    /// Start the scheduler
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is already running
    #[instrument(skip(self), fields(interval = ?self.config.interval))]
    pub async fn start(&self) -> SchedulerResult<()> {
        let service = self.service.clone();
        let connectivity = self.connectivity.clone();
        let interval = self.config.interval;
        self.task
            .start(move |cancel| Self::replay_loop(service, connectivity, interval, cancel))
            .await?;
        info!("Replay scheduler started");
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
        info!("Replay scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    async fn replay_loop(
        service: FetchService,
        mut connectivity: Option<watch::Receiver<bool>>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        if let Some(rx) = connectivity.as_mut() {
            rx.borrow_and_update();
        }

        loop {
            let mut source_closed = false;
            let reconnect = async {
                match connectivity.as_mut() {
                    Some(rx) => rx.changed().await.map(|()| *rx.borrow_and_update()),
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Replay loop cancelled");
                    break;
                }
                () = tokio::time::sleep(interval) => {
                    Self::replay_once(&service, "interval").await;
                }
                changed = reconnect => match changed {
                    Ok(true) => Self::replay_once(&service, "reconnect").await,
                    Ok(false) => debug!("Went offline; replay deferred"),
                    Err(_) => source_closed = true,
                },
            }

            if source_closed {
                debug!("Connectivity source dropped; interval replay only");
                connectivity = None;
            }
        }
    }

    async fn replay_once(service: &FetchService, trigger: &'static str) {
        match service.replay_background_queue().await {
            Ok(summary) if summary.replayed + summary.failed + summary.dropped > 0 => info!(
                trigger,
                replayed = summary.replayed,
                failed = summary.failed,
                dropped = summary.dropped,
                remaining = summary.remaining,
                "Background queue replay finished"
            ),
            Ok(_) => debug!(trigger, "Background queue empty"),
            Err(e) => error!(trigger, error = %e, "Background queue replay failed"),
        }
    }
}
