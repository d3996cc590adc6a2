//! Fetch wrapper options and results

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::http::{Headers, HttpMethod, HttpRequest};
use crate::constants::{
    CACHE_STATUS_HEADER, CACHE_STATUS_HIT, CACHE_STATUS_MISS, CACHE_STATUS_OFFLINE,
};
use crate::errors::{CacheError, Result};

/// How a request interacts with the cache tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// Serve GET requests from cache when present; write fresh GET responses
    #[default]
    Default,
    /// Always go to the network; still write the fresh response
    NoCache,
    /// Read and write the cache for every method, keyed by method and body
    ForceCache,
}

/// Per-call options. Unset fields fall back to `FetchSettings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub method: HttpMethod,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    pub cache: CacheMode,
    pub ttl: Option<Duration>,
    /// `false` limits the request to a single attempt
    pub retry: bool,
    pub timeout: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: HttpMethod::Get,
            headers: Headers::new(),
            body: None,
            cache: CacheMode::Default,
            ttl: None,
            retry: true,
            timeout: None,
        }
    }
}

impl FetchOptions {
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON request body.
    pub fn with_json_body<T: Serialize>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| CacheError::InvalidRequest(format!("unserializable body: {e}")))?;
        Ok(self.with_header("content-type", "application/json").with_body(body))
    }

    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    /// Whether this request may be served from and written to the cache.
    pub fn is_cacheable(&self) -> bool {
        match self.cache {
            CacheMode::ForceCache => true,
            CacheMode::Default | CacheMode::NoCache => self.method == HttpMethod::Get,
        }
    }

    pub fn reads_cache(&self) -> bool {
        self.cache != CacheMode::NoCache && self.is_cacheable()
    }

    pub fn to_request(&self, url: &str) -> HttpRequest {
        HttpRequest {
            method: self.method,
            url: url.to_string(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    /// Served from cache because the network failed while offline
    OfflineFallback,
}

impl ResponseSource {
    pub fn marker(self) -> &'static str {
        match self {
            Self::Network => CACHE_STATUS_MISS,
            Self::Cache => CACHE_STATUS_HIT,
            Self::OfflineFallback => CACHE_STATUS_OFFLINE,
        }
    }
}

/// Response handed back to fetch callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl FetchResponse {
    /// Builds a response and stamps the `x-cache` marker for `source`.
    pub fn new(
        url: impl Into<String>,
        status: u16,
        mut headers: Headers,
        body: Vec<u8>,
        source: ResponseSource,
    ) -> Self {
        headers.insert(CACHE_STATUS_HEADER.to_string(), source.marker().to_string());
        Self { url: url.into(), status, headers, body, source }
    }

    pub fn is_cache_hit(&self) -> bool {
        self.source != ResponseSource::Network
    }

    pub fn cache_marker(&self) -> Option<&str> {
        self.headers.get(CACHE_STATUS_HEADER).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| CacheError::InvalidRequest(format!("response body is not valid JSON: {e}")))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One element of a batch fetch.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub url: String,
    pub result: Result<FetchResponse>,
}

/// Result of `fetch_with_background_sync`.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Delivered(FetchResponse),
    /// The request failed and was queued for replay
    Queued { request_id: Uuid, error: CacheError },
}

/// A request waiting in the background queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub id: Uuid,
    pub request: HttpRequest,
    pub enqueued_at_ms: i64,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl QueuedRequest {
    pub fn new(request: HttpRequest, enqueued_at_ms: i64) -> Self {
        Self { id: Uuid::new_v4(), request, enqueued_at_ms, attempts: 0, last_error: None }
    }
}

/// Counts from one pass over the background queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub replayed: usize,
    pub failed: usize,
    pub dropped: usize,
    pub remaining: usize,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn default_options_cache_only_gets() {
        let get = FetchOptions::default();
        assert!(get.is_cacheable());
        assert!(get.reads_cache());

        let post = FetchOptions::default().with_method(HttpMethod::Post);
        assert!(!post.is_cacheable());
        assert!(post.clone().with_cache(CacheMode::ForceCache).is_cacheable());

        let no_cache = FetchOptions::default().with_cache(CacheMode::NoCache);
        assert!(no_cache.is_cacheable());
        assert!(!no_cache.reads_cache());
    }

    #[test]
    fn response_carries_cache_marker() {
        let response = FetchResponse::new(
            "https://example.test/a",
            200,
            Headers::new(),
            br#"{"n":1}"#.to_vec(),
            ResponseSource::Cache,
        );
        assert!(response.is_cache_hit());
        assert_eq!(response.cache_marker(), Some("HIT"));
        assert_eq!(response.json::<serde_json::Value>().unwrap(), json!({"n": 1}));
    }

    #[test]
    fn json_body_sets_content_type() {
        let options = FetchOptions::default()
            .with_method(HttpMethod::Post)
            .with_json_body(&json!({"q": "x"}))
            .unwrap();
        assert_eq!(options.headers.get("content-type").unwrap(), "application/json");
        assert_eq!(options.body.as_deref(), Some(br#"{"q":"x"}"#.as_slice()));
    }
}
