//! OpenID Connect discovery and key set acquisition.
//!
//! The provider metadata is fetched from
//! `{issuer}/.well-known/openid-configuration` and the key set from its
//! `jwks_uri`. Both are cached in the session cache and read back from there
//! on later page loads. A cached document is re-validated against the
//! configured issuer on every read, not only on fetch.
//!
//! # References
//!
//! - [OpenID Connect Discovery 1.0](https://openid.net/specs/openid-connect-discovery-1_0.html)

use std::sync::Arc;

use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{AuthConfig, ConfigError, trim_trailing_slash};
use crate::error::OidcError;
use crate::events::{AuthStateStore, Event};
use crate::http::{HttpError, HttpGateway};
use crate::storage::{CacheKey, StorageCache};

/// Path of the discovery document relative to the issuer.
pub const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// Provider metadata used by the relying party.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// Issuer identifier; must match the configured issuer.
    pub issuer: String,

    /// Authorization endpoint.
    pub authorization_endpoint: String,

    /// Token endpoint.
    pub token_endpoint: String,

    /// Location of the provider key set.
    pub jwks_uri: String,

    /// End-session endpoint (RP-initiated logout).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    /// Check-session iframe (session management).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_session_iframe: Option<String>,

    /// UserInfo endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// Supported grant types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,

    /// Supported PKCE methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,

    /// Supported ID token signing algorithms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_signing_alg_values_supported: Option<Vec<String>>,

    /// Key set, attached after it has been resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwkSet>,
}

impl DiscoveryDocument {
    /// Returns `true` if the provider advertises the PKCE method.
    #[must_use]
    pub fn supports_pkce_method(&self, method: &str) -> bool {
        self.code_challenge_methods_supported
            .as_ref()
            .is_some_and(|methods| methods.iter().any(|m| m == method))
    }

    /// Returns `true` if the provider advertises the `refresh_token` grant.
    #[must_use]
    pub fn supports_refresh_token(&self) -> bool {
        self.grant_types_supported
            .as_ref()
            .is_some_and(|grants| grants.iter().any(|g| g == "refresh_token"))
    }
}

/// Builds the discovery URL of an issuer.
#[must_use]
pub fn discovery_url(issuer: &str) -> String {
    format!("{}{WELL_KNOWN_PATH}", trim_trailing_slash(issuer))
}

/// Resolves the discovery document and key set, cache first.
#[derive(Debug, Clone)]
pub struct DiscoveryService {
    cache: StorageCache,
    http: Arc<dyn HttpGateway>,
    events: Arc<AuthStateStore>,
}

impl DiscoveryService {
    /// Creates a discovery service over the shared cache, gateway and event bus.
    #[must_use]
    pub fn new(cache: StorageCache, http: Arc<dyn HttpGateway>, events: Arc<AuthStateStore>) -> Self {
        Self {
            cache,
            http,
            events,
        }
    }

    /// Loads the discovery document with its key set attached.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::IssuerMismatch` if the (cached or fetched)
    /// document names another issuer and `validate_discovery` is set,
    /// `ConfigError::MissingDiscoveryDocument` if the endpoint returned
    /// `null`, or the network error of a failed fetch.
    pub async fn load_discovery_document(
        &self,
        config: &AuthConfig,
    ) -> Result<DiscoveryDocument, OidcError> {
        let mut document = match self.load_from_cache(config)? {
            Some(document) => document,
            None => self.fetch_document(config).await?,
        };

        let jwks = match self.cache.get::<JwkSet>(CacheKey::Jwks) {
            Some(jwks) => {
                tracing::debug!("Using cached JWKS");
                jwks
            }
            None => self.fetch_jwks(&document.jwks_uri).await?,
        };
        document.jwks = Some(jwks);

        Ok(document)
    }

    fn load_from_cache(&self, config: &AuthConfig) -> Result<Option<DiscoveryDocument>, ConfigError> {
        let Some(document) = self.cache.get::<DiscoveryDocument>(CacheKey::DiscoveryDocument) else {
            return Ok(None);
        };

        if config.validate_discovery {
            validate_issuer(&document, config)?;
        }

        tracing::debug!("Using cached discovery document for {}", document.issuer);
        Ok(Some(document))
    }

    async fn fetch_document(&self, config: &AuthConfig) -> Result<DiscoveryDocument, OidcError> {
        let url = discovery_url(&config.issuer);
        tracing::debug!("Fetching discovery document from {}", url);

        let value = self.http.get(&url, &[]).await?;
        if value.is_null() {
            return Err(ConfigError::MissingDiscoveryDocument.into());
        }

        let document: DiscoveryDocument = serde_json::from_value(value).map_err(|e| {
            tracing::warn!("Failed to parse discovery document from {}: {}", url, e);
            HttpError::Parse(e.to_string())
        })?;

        if config.validate_discovery {
            validate_issuer(&document, config)?;
        }

        self.cache.set(CacheKey::DiscoveryDocument, &document)?;
        self.events.emit_event(Event::DiscoveryDocumentLoaded);

        tracing::debug!(
            "Successfully discovered OIDC configuration for {}",
            document.issuer
        );
        Ok(document)
    }

    /// Fetches the key set from `jwks_uri`, replacing the cached one.
    ///
    /// # Errors
    ///
    /// Returns the network error of a failed fetch or `HttpError::Parse` for
    /// a body that is not a key set.
    pub async fn fetch_jwks(&self, jwks_uri: &str) -> Result<JwkSet, OidcError> {
        tracing::debug!("Fetching JWKS from {}", jwks_uri);

        let value: Value = self.http.get(jwks_uri, &[]).await?;
        let jwks: JwkSet = serde_json::from_value(value).map_err(|e| {
            tracing::warn!("Failed to parse JWKS from {}: {}", jwks_uri, e);
            HttpError::Parse(e.to_string())
        })?;

        self.cache.set(CacheKey::Jwks, &jwks)?;
        self.events.emit_event(Event::JwksLoaded);

        tracing::debug!("Loaded {} keys from {}", jwks.keys.len(), jwks_uri);
        Ok(jwks)
    }
}

/// Checks that the trimmed document issuer equals the trimmed configured issuer.
fn validate_issuer(document: &DiscoveryDocument, config: &AuthConfig) -> Result<(), ConfigError> {
    let expected = config.trimmed_issuer();
    let actual = trim_trailing_slash(&document.issuer);

    if expected != actual {
        tracing::warn!(expected, actual, "Discovery document issuer mismatch");
        return Err(ConfigError::IssuerMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}
