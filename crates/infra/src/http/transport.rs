use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Method};
use tiercache_core::HttpTransport;
use tiercache_domain::{
    CacheError, FetchSettings, Headers, HttpMethod, HttpRequest, HttpResponse, NetworkError,
};
use tracing::debug;

use crate::errors::{InfraError, IntoNetworkError};

/// reqwest-backed [`HttpTransport`]. One call to `send` is one physical
/// exchange; retries and caching happen in the fetch service.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Start building a new transport.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, CacheError> {
        Self::builder().build()
    }

    /// Client configured from the fetch section of the config.
    pub fn from_settings(settings: &FetchSettings) -> Result<Self, CacheError> {
        Self::builder().timeout(settings.timeout).user_agent(settings.user_agent.clone()).build()
    }

    fn map_error(&self, err: reqwest::Error) -> NetworkError {
        if err.is_timeout() {
            return NetworkError::timeout(self.timeout);
        }
        err.into_network_error()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        let method = to_reqwest_method(request.method);
        let mut builder = self.client.request(method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        debug!(%method, url = %request.url, "sending HTTP request");
        let response = builder.send().await.map_err(|err| {
            debug!(%method, url = %request.url, error = %err, "HTTP request failed");
            self.map_error(err)
        })?;

        let status = response.status().as_u16();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|err| self.map_error(err))?.to_vec();
        debug!(%method, url = %request.url, status, bytes = body.len(), "received HTTP response");

        Ok(HttpResponse { status, headers, body })
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug)]
pub struct ReqwestTransportBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: Option<reqwest::header::HeaderMap>,
}

impl Default for ReqwestTransportBuilder {
    fn default() -> Self {
        Self {
            timeout: tiercache_domain::constants::DEFAULT_FETCH_TIMEOUT,
            user_agent: None,
            default_headers: None,
        }
    }
}

impl ReqwestTransportBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    pub fn build(self) -> Result<ReqwestTransport, CacheError> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|err| {
            let infra: InfraError = err.into();
            CacheError::from(infra)
        })?;

        Ok(ReqwestTransport { client, timeout: self.timeout })
    }
}
