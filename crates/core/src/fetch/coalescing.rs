//! In-flight request registry
//!
//! At most one network task runs per request key. The task is spawned, so
//! it keeps running even if the caller that started it is dropped, and every
//! caller for the same key awaits one shared result. The task removes its
//! own registry entry when it finishes.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tiercache_domain::{CacheError, FetchResponse, Result};

pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<FetchResponse>>>;

#[derive(Debug, Default)]
pub(crate) struct InFlight {
    calls: Mutex<HashMap<String, SharedFetch>>,
}

impl InFlight {
    /// Returns the shared result for `key`, spawning `start()` when nothing
    /// is in flight. The flag is `true` when the caller joined an existing
    /// request.
    pub(crate) fn join_or_start<F>(self: &Arc<Self>, key: &str, start: F) -> (SharedFetch, bool)
    where
        F: FnOnce() -> BoxFuture<'static, Result<FetchResponse>>,
    {
        let mut calls = self.calls.lock();
        if let Some(existing) = calls.get(key) {
            return (existing.clone(), true);
        }

        let registry = Arc::clone(self);
        let owned_key = key.to_string();
        let work = start();
        // The task cannot deregister before we release `calls`.
        let handle = tokio::spawn(async move {
            let result = work.await;
            registry.calls.lock().remove(&owned_key);
            result
        });

        let shared = async move {
            handle
                .await
                .unwrap_or_else(|err| Err(CacheError::internal(format!("fetch task failed: {err}"))))
        }
        .boxed()
        .shared();
        calls.insert(key.to_string(), shared.clone());
        (shared, false)
    }

    pub(crate) fn len(&self) -> usize {
        self.calls.lock().len()
    }
}
