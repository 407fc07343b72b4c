//! HTTP gateway contract.
//!
//! The flow only needs two operations: a JSON `GET` for discovery and JWKS
//! and a form `POST` for the token endpoint. Hosts inject an implementation;
//! [`ReqwestGateway`] is the default one. The gateway never retries and does
//! not interpret status codes, so an OAuth error body from the token endpoint
//! reaches the caller as a normal JSON value.

pub mod reqwest_gateway;

use async_trait::async_trait;
use serde_json::Value;

pub use reqwest_gateway::{HttpGatewayConfig, ReqwestGateway};

/// Content type of token endpoint requests.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Errors produced by an [`HttpGateway`].
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The request could not be sent or the response could not be read.
    #[error("Network error: {0}")]
    Network(String),

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: usize,
    },

    /// The response body is not the expected JSON.
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

/// Pluggable GET/POST transport.
#[async_trait]
pub trait HttpGateway: Send + Sync {
    /// Fetches `url` and returns its JSON body.
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value, HttpError>;

    /// Posts a pre-encoded `body` to `url` and returns the JSON response body.
    async fn post(
        &self,
        url: &str,
        body: String,
        headers: &[(&str, &str)],
    ) -> Result<Value, HttpError>;
}

impl std::fmt::Debug for dyn HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HttpGateway")
    }
}

/// Posts a form body to `url` and returns the raw JSON response.
///
/// # Errors
///
/// Returns the gateway error.
pub async fn post_form(gateway: &dyn HttpGateway, url: &str, body: String) -> Result<Value, HttpError> {
    gateway
        .post(url, body, &[("Content-Type", FORM_CONTENT_TYPE)])
        .await
}
