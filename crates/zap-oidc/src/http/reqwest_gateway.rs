//! [`HttpGateway`] over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{HttpError, HttpGateway};

/// Configuration for [`ReqwestGateway`].
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// HTTP request timeout (default: 10 seconds).
    pub request_timeout: Duration,

    /// Maximum response size in bytes (default: 1 MB).
    pub max_response_size: usize,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_response_size: 1024 * 1024,
        }
    }
}

impl HttpGatewayConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum response size.
    #[must_use]
    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }
}

/// Gateway sending requests with a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestGateway {
    http_client: reqwest::Client,
    config: HttpGatewayConfig,
}

impl ReqwestGateway {
    /// Creates a gateway with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Network` if the HTTP client cannot be built.
    pub fn new(config: HttpGatewayConfig) -> Result<Self, HttpError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| HttpError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    /// Creates a gateway with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Network` if the HTTP client cannot be built.
    pub fn with_defaults() -> Result<Self, HttpError> {
        Self::new(HttpGatewayConfig::default())
    }

    async fn send(
        &self,
        mut request: reqwest::RequestBuilder,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Value, HttpError> {
        request = request.header("Accept", "application/json");
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!("Request to {} failed: {}", url, e);
            HttpError::Network(e.to_string())
        })?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && exceeds_limit(len, self.config.max_response_size)
        {
            return Err(HttpError::ResponseTooLarge {
                max_size: self.config.max_response_size,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::Network(e.to_string()))?;

        if body.len() > self.config.max_response_size {
            return Err(HttpError::ResponseTooLarge {
                max_size: self.config.max_response_size,
            });
        }

        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => {
                tracing::debug!(status = status.as_u16(), "Received response from {}", url);
                Ok(value)
            }
            Err(_) if !status.is_success() => {
                Err(HttpError::Network(format!("HTTP status {}", status.as_u16())))
            }
            Err(e) => {
                tracing::warn!("Failed to parse response from {}: {}", url, e);
                Err(HttpError::Parse(e.to_string()))
            }
        }
    }
}

/// A declared length that does not fit in `usize` is over any limit.
fn exceeds_limit(len: u64, max_size: usize) -> bool {
    usize::try_from(len).map_or(true, |len| len > max_size)
}

#[async_trait]
impl HttpGateway for ReqwestGateway {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value, HttpError> {
        self.send(self.http_client.get(url), url, headers).await
    }

    async fn post(
        &self,
        url: &str,
        body: String,
        headers: &[(&str, &str)],
    ) -> Result<Value, HttpError> {
        self.send(self.http_client.post(url).body(body), url, headers)
            .await
    }
}
