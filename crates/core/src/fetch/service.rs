//! Cache-aware fetch service

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{join_all, FutureExt};
use serde::Serialize;
use tiercache_common::resilience::policies::Classified;
use tiercache_common::{
    Lifecycle, ManagerHealth, ManagerStatus, RetryConfig, RetryError, RetryExecutor, SharedClock,
    StatusCell,
};
use tiercache_domain::{
    BatchItem, CacheError, CachedValue, FetchOptions, FetchResponse, FetchSettings, Headers,
    HttpRequest, HttpResponse, NetworkError, Partition, ResponseSource, Result,
};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::coalescing::InFlight;
use super::metrics::{FetchMetrics, FetchMetricsSnapshot};
use crate::facade::{CacheFacade, FacadeStats};
use crate::keys::{derive_key_str, request_key};
use crate::ports::{ConnectivityProbe, HttpTransport};

/// Snapshot returned by [`FetchService::get_cache_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct FetchStats {
    pub cache: FacadeStats,
    pub fetch: FetchMetricsSnapshot,
    /// Requests currently on the wire
    pub in_flight: usize,
    pub online: bool,
}

/// Network fetch wrapper with caching, coalescing, retry and offline
/// fallback. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct FetchService {
    pub(super) inner: Arc<FetchInner>,
}

pub(super) struct FetchInner {
    pub(super) facade: Arc<CacheFacade>,
    transport: Arc<dyn HttpTransport>,
    pub(super) connectivity: Arc<dyn ConnectivityProbe>,
    pub(super) settings: FetchSettings,
    pub(super) clock: SharedClock,
    in_flight: Arc<InFlight>,
    pub(super) metrics: FetchMetrics,
    prefetch_permits: Semaphore,
    status: StatusCell,
}

impl FetchService {
    pub fn new(
        facade: Arc<CacheFacade>,
        transport: Arc<dyn HttpTransport>,
        connectivity: Arc<dyn ConnectivityProbe>,
        settings: FetchSettings,
        clock: SharedClock,
    ) -> Self {
        let prefetch_permits = Semaphore::new(settings.prefetch_concurrency.max(1));
        Self {
            inner: Arc::new(FetchInner {
                facade,
                transport,
                connectivity,
                settings,
                clock,
                in_flight: Arc::new(InFlight::default()),
                metrics: FetchMetrics::default(),
                prefetch_permits,
                status: StatusCell::default(),
            }),
        }
    }

    pub fn facade(&self) -> &Arc<CacheFacade> {
        &self.inner.facade
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.inner.settings
    }

    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    /// Fetches `url`, serving from cache when allowed and falling back to a
    /// cached copy when the network fails while offline.
    #[instrument(skip(self, options), fields(method = %options.method))]
    pub async fn fetch(&self, url: &str, options: FetchOptions) -> Result<FetchResponse> {
        let fallback = self.inner.settings.offline_fallback;
        self.fetch_inner(url, options, fallback).await
    }

    /// Like [`fetch`](Self::fetch) with offline fallback always enabled.
    /// While offline a cached copy is returned without touching the network.
    pub async fn fetch_with_offline_fallback(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> Result<FetchResponse> {
        if !self.is_online() && options.is_cacheable() {
            validate_url(url)?;
            let key = request_key(options.method, url, options.body.as_deref());
            if let Some(response) = self.inner.cached_response(url, &key, ResponseSource::OfflineFallback).await {
                self.inner.metrics.record_request();
                self.inner.metrics.record_offline_fallback();
                return Ok(response);
            }
        }
        self.fetch_inner(url, options, true).await
    }

    /// Fetches every URL concurrently. One failure never fails the batch.
    pub async fn batch_fetch<S: AsRef<str>>(&self, urls: &[S], options: FetchOptions) -> Vec<BatchItem> {
        let fetches = urls.iter().map(|url| {
            let url = url.as_ref().to_string();
            let options = options.clone();
            async move {
                let result = self.fetch(&url, options).await;
                BatchItem { url, result }
            }
        });
        join_all(fetches).await
    }

    /// Warms the cache for `urls` at low priority. URLs already cached are
    /// skipped and failures are logged. Returns how many URLs were fetched.
    pub async fn prefetch<S: AsRef<str>>(&self, urls: &[S], options: FetchOptions) -> usize {
        let warmups = urls.iter().map(|url| {
            let url = url.as_ref();
            let options = options.clone();
            async move { self.prefetch_one(url, options).await }
        });
        join_all(warmups).await.into_iter().filter(|warmed| *warmed).count()
    }

    async fn prefetch_one(&self, url: &str, options: FetchOptions) -> bool {
        let key = request_key(options.method, url, options.body.as_deref());
        if options.is_cacheable() && self.inner.facade.lookup(Partition::ApiResponses, &key).await.is_some() {
            debug!(url, "prefetch skipped; already cached");
            return false;
        }

        let Ok(_permit) = self.inner.prefetch_permits.acquire().await else {
            return false;
        };
        match self.fetch(url, options).await {
            Ok(_) => true,
            Err(err) => {
                debug!(url, error = %err, "prefetch failed");
                false
            }
        }
    }

    /// Removes one URL's cached GET response, or every cached item.
    pub async fn clear_cache(&self, url: Option<&str>) {
        match url {
            Some(url) => {
                self.inner.facade.remove(Partition::ApiResponses, &derive_key_str(url)).await;
            }
            None => {
                for partition in Partition::CONTENT {
                    self.inner.facade.clear_partition(partition).await;
                }
            }
        }
    }

    pub async fn get_cache_stats(&self) -> FetchStats {
        FetchStats {
            cache: self.inner.facade.stats().await,
            fetch: self.inner.metrics.snapshot(),
            in_flight: self.inner.in_flight.len(),
            online: self.is_online(),
        }
    }

    pub(super) async fn fetch_inner(
        &self,
        url: &str,
        options: FetchOptions,
        offline_fallback: bool,
    ) -> Result<FetchResponse> {
        validate_url(url)?;
        let inner = &self.inner;
        inner.metrics.record_request();
        let key = request_key(options.method, url, options.body.as_deref());

        if options.reads_cache() {
            if let Some(response) = inner.cached_response(url, &key, ResponseSource::Cache).await {
                debug!(url, "cache hit");
                inner.metrics.record_cache_hit();
                return Ok(response);
            }
        }

        let cacheable = options.is_cacheable();
        match self.network(url, options, &key).await {
            Ok(response) => Ok(response),
            Err(err) => {
                if offline_fallback && cacheable && !inner.connectivity.is_online() {
                    if let Some(response) =
                        inner.cached_response(url, &key, ResponseSource::OfflineFallback).await
                    {
                        info!(url, error = %err, "serving cached copy while offline");
                        inner.metrics.record_offline_fallback();
                        return Ok(response);
                    }
                }
                inner.metrics.record_failure();
                Err(err)
            }
        }
    }

    /// Joins the in-flight request for `key` or starts one.
    async fn network(&self, url: &str, options: FetchOptions, key: &str) -> Result<FetchResponse> {
        let (shared, joined) = self.inner.in_flight.join_or_start(key, || {
            let inner = Arc::clone(&self.inner);
            let url = url.to_string();
            let key = key.to_string();
            async move { inner.fetch_from_network(&url, &options, &key).await }.boxed()
        });
        if joined {
            debug!(url, "joined in-flight request");
            self.inner.metrics.record_coalesced();
        }
        shared.await
    }
}

impl FetchInner {
    async fn fetch_from_network(
        &self,
        url: &str,
        options: &FetchOptions,
        key: &str,
    ) -> Result<FetchResponse> {
        let mut request = options.to_request(url);
        request
            .headers
            .entry("user-agent".to_string())
            .or_insert_with(|| self.settings.user_agent.clone());
        let timeout = options.timeout.unwrap_or(self.settings.timeout);

        let executor = RetryExecutor::new(self.retry_config(options.retry)?, Classified);
        let outcome = executor
            .execute_with_outcome(|_| self.attempt(request.clone(), timeout))
            .await;
        self.metrics.record_retries(outcome.retries());

        let response = match outcome.result {
            Ok(response) => response,
            Err(RetryError::Exhausted { attempts, last }) if attempts > 1 => {
                return Err(NetworkError::Exhausted { attempts, last: Box::new(last) }.into());
            }
            Err(RetryError::Exhausted { last: error, .. } | RetryError::NonRetryable { error, .. }) => {
                return Err(error.into());
            }
            Err(RetryError::InvalidConfiguration { message }) => {
                return Err(CacheError::Config(message));
            }
        };

        if options.is_cacheable() {
            let value = cached_value_for(&response);
            self.facade.store(Partition::ApiResponses, key, value, options.ttl).await;
        }
        Ok(FetchResponse::new(url, response.status, response.headers, response.body, ResponseSource::Network))
    }

    /// One physical attempt bounded by `timeout`. Non-2xx becomes an error.
    async fn attempt(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> std::result::Result<HttpResponse, NetworkError> {
        let started = tokio::time::Instant::now();
        let result = tokio::time::timeout(timeout, self.transport.send(request)).await;
        self.metrics.record_network_call(started.elapsed());

        match result {
            Err(_) => Err(NetworkError::timeout(timeout)),
            Ok(Err(err)) => Err(err),
            Ok(Ok(response)) if response.is_success() => Ok(response),
            Ok(Ok(response)) => Err(NetworkError::Status { status: response.status }),
        }
    }

    fn retry_config(&self, retry: bool) -> Result<RetryConfig> {
        if !retry {
            return Ok(RetryConfig::no_retry());
        }
        RetryConfig::builder()
            .max_attempts(self.settings.retry_attempts)
            .exponential_backoff(self.settings.retry_delay, 2.0, self.settings.max_retry_delay)
            .build()
            .map_err(|err| CacheError::Config(err.to_string()))
    }

    async fn cached_response(
        &self,
        url: &str,
        key: &str,
        source: ResponseSource,
    ) -> Option<FetchResponse> {
        let value = self.facade.lookup(Partition::ApiResponses, key).await?;
        Some(response_from_cache(url, value, source))
    }
}

/// JSON bodies are cached as structured values, everything else as bytes.
fn cached_value_for(response: &HttpResponse) -> CachedValue {
    if response.is_json() {
        if let Ok(value) = serde_json::from_slice(&response.body) {
            return CachedValue::json(value);
        }
    }
    CachedValue::binary(response.body.clone(), response.content_type().map(str::to_string))
}

fn response_from_cache(url: &str, value: CachedValue, source: ResponseSource) -> FetchResponse {
    let mut headers = Headers::new();
    let body = match value {
        CachedValue::Json { value } | CachedValue::Opaque { value } => {
            headers.insert("content-type".into(), "application/json".into());
            value.to_string().into_bytes()
        }
        CachedValue::Binary { content_type, data } => {
            if let Some(content_type) = content_type {
                headers.insert("content-type".into(), content_type);
            }
            data
        }
    };
    FetchResponse::new(url, 200, headers, body, source)
}

fn validate_url(url: &str) -> Result<()> {
    let parsed = url::Url::parse(url)
        .map_err(|e| CacheError::InvalidRequest(format!("invalid url '{url}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CacheError::InvalidRequest(format!("unsupported scheme in '{url}'")));
    }
    Ok(())
}

impl std::fmt::Debug for FetchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchService")
            .field("settings", &self.inner.settings)
            .field("in_flight", &self.inner.in_flight.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Lifecycle for FetchService {
    type Error = CacheError;

    fn name(&self) -> &'static str {
        "fetch_service"
    }

    async fn initialize(&self) -> Result<()> {
        if !self.inner.status.transition(
            &[ManagerStatus::Created, ManagerStatus::Shutdown, ManagerStatus::Error],
            ManagerStatus::Initializing,
        ) {
            return Ok(());
        }
        self.inner.facade.initialize().await?;
        self.inner.status.set(ManagerStatus::Running);
        info!(
            timeout_ms = ?self.inner.settings.timeout,
            attempts = self.inner.settings.retry_attempts,
            "fetch service ready"
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.inner.status.transition(&[ManagerStatus::Running], ManagerStatus::ShuttingDown) {
            return Ok(());
        }
        let pending = self.inner.in_flight.len();
        if pending > 0 {
            warn!(pending, "shutting down with requests in flight");
        }
        self.inner.status.set(ManagerStatus::Shutdown);
        Ok(())
    }

    async fn health_check(&self) -> ManagerHealth {
        let status = self.inner.status.get();
        if !status.is_running() {
            return ManagerHealth::unhealthy(format!("fetch service is {status}"));
        }
        if self.is_online() {
            ManagerHealth::healthy()
        } else {
            ManagerHealth::degraded(0.7, "offline; serving cached responses only")
        }
    }

    fn status(&self) -> ManagerStatus {
        self.inner.status.get()
    }
}
