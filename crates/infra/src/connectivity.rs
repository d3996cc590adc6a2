//! Host-driven connectivity status

use std::sync::Arc;

use tiercache_core::ConnectivityProbe;
use tokio::sync::watch;
use tracing::info;

/// Online/offline flag set by the host application.
///
/// Cloning shares the same flag. Subscribers are notified on every change,
/// which the replay scheduler uses to drain the background queue as soon as
/// the host comes back online.
#[derive(Debug, Clone)]
pub struct NetworkStatus {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    /// Updates the flag. Subscribers only wake when the value changes.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "connectivity changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::online()
    }
}

impl ConnectivityProbe for NetworkStatus {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }
}
