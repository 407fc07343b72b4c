//! Relying-party configuration.
//!
//! [`AuthConfig`] is supplied by the host application and is immutable for
//! the life of a session, except that `init_auth` merges the endpoints and
//! key set resolved through discovery into it.
//!
//! # Example (TOML)
//!
//! ```toml
//! issuer = "https://idp.example"
//! client_id = "spa"
//! redirect_uri = "https://app.example/callback"
//! post_logout_redirect_uri = "https://app.example/"
//! scope = "openid profile offline_access"
//! clock_skew = "30s"
//! check_session_iframe_timeout = "5s"
//! ```

use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::QueryParams;

/// The OAuth 2.0 response type. Only the authorization code flow is supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Authorization code flow.
    #[default]
    Code,
}

impl ResponseType {
    /// Get the response type as sent on the authorize request.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
        }
    }

    /// The grant type used to redeem this response type.
    #[must_use]
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::Code => "authorization_code",
        }
    }
}

/// Relying-party configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer URL of the provider.
    pub issuer: String,

    /// Client id registered at the provider.
    pub client_id: String,

    /// Redirect URI registered at the provider.
    pub redirect_uri: String,

    /// Where `local_logout` sends the user.
    pub post_logout_redirect_uri: String,

    /// Space separated scopes.
    pub scope: String,

    /// Response type; fixed to `code`.
    pub response_type: ResponseType,

    /// Authorization endpoint; resolved through discovery when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorize_endpoint: Option<String>,

    /// Token endpoint; resolved through discovery when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// End-session endpoint used by `logout`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endsession_endpoint: Option<String>,

    /// Provider key set; resolved through discovery when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwkSet>,

    /// Check-session iframe URL; resolved through discovery when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_session_iframe: Option<String>,

    /// Extra parameters added to every authorize request.
    pub query_params: QueryParams,

    /// Resolve endpoints through the discovery document.
    pub discovery: bool,

    /// Check the issuer of the discovery document.
    pub validate_discovery: bool,

    /// Require HTTPS for the issuer and all endpoints.
    pub use_https: bool,

    /// Restore the route the user logged in from after the callback.
    pub preserve_route: bool,

    /// Never start the check-session monitor.
    pub disable_check_session: bool,

    /// Do not add `prompt=consent` when `offline_access` is requested.
    pub disable_refresh_token_consent: bool,

    /// Tolerated clock difference for `exp` and `iat`.
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,

    /// Poll interval of the check-session iframe.
    #[serde(with = "humantime_serde")]
    pub check_session_iframe_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            client_id: String::new(),
            redirect_uri: String::new(),
            post_logout_redirect_uri: String::new(),
            scope: "openid".to_string(),
            response_type: ResponseType::Code,
            authorize_endpoint: None,
            token_endpoint: None,
            endsession_endpoint: None,
            jwks: None,
            check_session_iframe: None,
            query_params: QueryParams::new(),
            discovery: true,
            validate_discovery: true,
            use_https: true,
            preserve_route: true,
            disable_check_session: false,
            disable_refresh_token_consent: false,
            clock_skew: Duration::ZERO,
            check_session_iframe_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// An endpoint does not use HTTPS.
    #[error("TLS check failed for {name}: {url}")]
    InsecureEndpoint {
        /// Which endpoint failed.
        name: &'static str,
        /// The offending URL.
        url: String,
    },

    /// The discovery document names a different issuer.
    #[error("Invalid issuer in discovery document: expected {expected}, got {actual}")]
    IssuerMismatch {
        /// The configured issuer.
        expected: String,
        /// The issuer of the document.
        actual: String,
    },

    /// The discovery endpoint returned no document.
    #[error("Discovery document is required")]
    MissingDiscoveryDocument,
}

impl AuthConfig {
    /// Creates a configuration with the required values and defaults elsewhere.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            ..Self::default()
        }
    }

    /// Parses and validates a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the TOML does not parse, or any
    /// error reported by [`AuthConfig::validate`].
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(input).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the post-logout redirect URI.
    #[must_use]
    pub fn with_post_logout_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.post_logout_redirect_uri = uri.into();
        self
    }

    /// Sets the requested scopes.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Sets the authorization endpoint.
    #[must_use]
    pub fn with_authorize_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.authorize_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the token endpoint.
    #[must_use]
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the end-session endpoint.
    #[must_use]
    pub fn with_endsession_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endsession_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the provider key set.
    #[must_use]
    pub fn with_jwks(mut self, jwks: JwkSet) -> Self {
        self.jwks = Some(jwks);
        self
    }

    /// Adds a parameter sent on every authorize request.
    #[must_use]
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    /// Enables or disables discovery.
    #[must_use]
    pub fn with_discovery(mut self, enabled: bool) -> Self {
        self.discovery = enabled;
        self
    }

    /// Enables or disables the discovery issuer check.
    #[must_use]
    pub fn with_validate_discovery(mut self, enabled: bool) -> Self {
        self.validate_discovery = enabled;
        self
    }

    /// Enables or disables the HTTPS requirement.
    ///
    /// # Warning
    ///
    /// Only disable this against a local development provider.
    #[must_use]
    pub fn with_use_https(mut self, enabled: bool) -> Self {
        self.use_https = enabled;
        self
    }

    /// Enables or disables restoring the pre-login route.
    #[must_use]
    pub fn with_preserve_route(mut self, enabled: bool) -> Self {
        self.preserve_route = enabled;
        self
    }

    /// Disables the check-session monitor.
    #[must_use]
    pub fn with_disable_check_session(mut self, disabled: bool) -> Self {
        self.disable_check_session = disabled;
        self
    }

    /// Disables `prompt=consent` for `offline_access` requests.
    #[must_use]
    pub fn with_disable_refresh_token_consent(mut self, disabled: bool) -> Self {
        self.disable_refresh_token_consent = disabled;
        self
    }

    /// Sets the clock skew tolerance.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Sets the check-session poll interval.
    #[must_use]
    pub fn with_check_session_iframe_timeout(mut self, timeout: Duration) -> Self {
        self.check_session_iframe_timeout = timeout;
        self
    }

    /// Validates the configuration as supplied by the caller.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the issuer, client id or redirect URI
    /// is empty, or if discovery is disabled and the authorize endpoint,
    /// token endpoint or key set is absent. Returns
    /// `ConfigError::InvalidValue` for unparsable URLs or a zero poll interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer".to_string()));
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::Missing("client_id".to_string()));
        }
        if self.redirect_uri.is_empty() {
            return Err(ConfigError::Missing("redirect_uri".to_string()));
        }

        parse_url("issuer", &self.issuer)?;
        parse_url("redirect_uri", &self.redirect_uri)?;

        if self.check_session_iframe_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "check_session_iframe_timeout must be greater than zero".to_string(),
            ));
        }

        if !self.discovery {
            self.require_endpoints()?;
        }

        Ok(())
    }

    /// Checks that the authorize endpoint, token endpoint and key set are known.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` naming the first absent value.
    pub fn require_endpoints(&self) -> Result<(), ConfigError> {
        if self.authorize_endpoint.is_none() {
            return Err(ConfigError::Missing(
                "authorize_endpoint (required when not using discovery)".to_string(),
            ));
        }
        if self.token_endpoint.is_none() {
            return Err(ConfigError::Missing(
                "token_endpoint (required when not using discovery)".to_string(),
            ));
        }
        if self.jwks.is_none() {
            return Err(ConfigError::Missing("jwks".to_string()));
        }
        Ok(())
    }

    /// Checks that the issuer and every configured endpoint use HTTPS.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InsecureEndpoint` naming the first offender.
    pub fn check_https(&self) -> Result<(), ConfigError> {
        let endpoints = [
            ("issuer", Some(&self.issuer)),
            ("authorize endpoint", self.authorize_endpoint.as_ref()),
            ("token endpoint", self.token_endpoint.as_ref()),
            ("end session endpoint", self.endsession_endpoint.as_ref()),
        ];

        for (name, url) in endpoints {
            if let Some(url) = url
                && !is_https(url)
            {
                return Err(ConfigError::InsecureEndpoint {
                    name,
                    url: url.clone(),
                });
            }
        }
        Ok(())
    }

    /// The issuer without its trailing slash.
    #[must_use]
    pub fn trimmed_issuer(&self) -> &str {
        trim_trailing_slash(&self.issuer)
    }

    /// Origin of the issuer, used to scope check-session messages.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the issuer is not a URL.
    pub fn issuer_origin(&self) -> Result<String, ConfigError> {
        Ok(parse_url("issuer", &self.issuer)?
            .origin()
            .ascii_serialization())
    }

    /// Origin of the redirect URI, i.e. the application's own origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the redirect URI is not a URL.
    pub fn redirect_origin(&self) -> Result<String, ConfigError> {
        Ok(parse_url("redirect_uri", &self.redirect_uri)?
            .origin()
            .ascii_serialization())
    }

    /// Returns `true` if `offline_access` is among the requested scopes.
    #[must_use]
    pub fn requests_offline_access(&self) -> bool {
        self.scope.split_whitespace().any(|s| s == "offline_access")
    }
}

/// Removes a single trailing slash.
#[must_use]
pub fn trim_trailing_slash(value: &str) -> &str {
    value.strip_suffix('/').unwrap_or(value)
}

/// Returns `true` if the URL uses the `https` scheme.
#[must_use]
pub fn is_https(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| u.scheme() == "https")
}

pub(crate) fn parse_url(name: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidValue(format!("{name}: {value} - {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AuthConfig {
        AuthConfig::new("https://idp.example", "c1", "https://app.example/cb")
    }

    #[test]
    fn test_defaults() {
        let config = base_config();
        assert_eq!(config.scope, "openid");
        assert_eq!(config.response_type, ResponseType::Code);
        assert!(config.discovery);
        assert!(config.validate_discovery);
        assert!(config.use_https);
        assert!(config.preserve_route);
        assert!(!config.disable_check_session);
        assert_eq!(config.clock_skew, Duration::ZERO);
        assert_eq!(config.check_session_iframe_timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_values() {
        let err = AuthConfig::new("", "c1", "https://app.example/cb")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref f) if f == "issuer"));

        let err = AuthConfig::new("https://idp.example", "", "https://app.example/cb")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref f) if f == "client_id"));

        let err = AuthConfig::new("not a url", "c1", "https://app.example/cb")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_validate_without_discovery_requires_endpoints() {
        let config = base_config().with_discovery(false);
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));

        let config = base_config()
            .with_discovery(false)
            .with_authorize_endpoint("https://idp.example/authorize")
            .with_token_endpoint("https://idp.example/token");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref f) if f == "jwks"));

        let config = config.with_jwks(JwkSet { keys: vec![] });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_check_https() {
        let config = base_config()
            .with_authorize_endpoint("https://idp.example/authorize")
            .with_token_endpoint("http://idp.example/token");
        let err = config.check_https().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InsecureEndpoint { name: "token endpoint", .. }
        ));

        let config = AuthConfig::new("http://idp.example", "c1", "https://app.example/cb");
        assert!(config.check_https().is_err());

        let config = base_config().with_token_endpoint("https://idp.example/token");
        assert!(config.check_https().is_ok());
    }

    #[test]
    fn test_origins() {
        let config = AuthConfig::new("https://idp.example/realms/a/", "c1", "https://app.example:8443/cb");
        assert_eq!(config.issuer_origin().unwrap(), "https://idp.example");
        assert_eq!(config.redirect_origin().unwrap(), "https://app.example:8443");
        assert_eq!(config.trimmed_issuer(), "https://idp.example/realms/a");
    }

    #[test]
    fn test_requests_offline_access() {
        assert!(!base_config().requests_offline_access());
        assert!(
            base_config()
                .with_scope("openid offline_access")
                .requests_offline_access()
        );
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
            issuer = "https://idp.example"
            client_id = "spa"
            redirect_uri = "https://app.example/cb"
            scope = "openid profile"
            clock_skew = "30s"
            check_session_iframe_timeout = "10s"
            preserve_route = false

            [query_params]
            ui_locales = "de"
        "#;

        let config = AuthConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.client_id, "spa");
        assert_eq!(config.clock_skew, Duration::from_secs(30));
        assert_eq!(config.check_session_iframe_timeout, Duration::from_secs(10));
        assert!(!config.preserve_route);
        assert_eq!(config.query_params.get("ui_locales").map(String::as_str), Some("de"));
        assert!(config.discovery);
    }

    #[test]
    fn test_from_toml_rejects_invalid() {
        assert!(AuthConfig::from_toml_str("issuer = 5").is_err());
        assert!(matches!(
            AuthConfig::from_toml_str("client_id = \"spa\""),
            Err(ConfigError::Missing(_))
        ));
    }
}
