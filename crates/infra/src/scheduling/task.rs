//! Start/stop bookkeeping shared by the schedulers

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{SchedulerError, SchedulerResult};

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// One background loop, restartable after `stop`.
#[derive(Debug, Default)]
pub(crate) struct ScheduledTask {
    cancellation_token: Mutex<CancellationToken>,
    task_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ScheduledTask {
    /// Spawns `run` with a fresh cancellation token.
    pub(crate) async fn start<F, Fut>(&self, run: F) -> SchedulerResult<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.task_handle.lock().await;
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        *self.cancellation_token.lock() = token.clone();
        *slot = Some(tokio::spawn(run(token)));
        Ok(())
    }

    /// Cancels the loop and waits for it to exit.
    pub(crate) async fn stop(&self) -> SchedulerResult<()> {
        let handle = self.task_handle.lock().await.take();
        let Some(handle) = handle.filter(|h| !h.is_finished()) else {
            return Err(SchedulerError::NotRunning);
        };

        self.cancellation_token.lock().cancel();
        tokio::time::timeout(JOIN_TIMEOUT, handle)
            .await
            .map_err(|source| SchedulerError::Timeout { duration: JOIN_TIMEOUT, source })??;
        Ok(())
    }

    /// A scheduler is running if it has an active task handle that hasn't
    /// finished.
    pub(crate) fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

/// Ensure the loop is stopped when dropped
impl Drop for ScheduledTask {
    fn drop(&mut self) {
        let token = self.cancellation_token.get_mut();
        if !token.is_cancelled() {
            token.cancel();
        }
    }
}
