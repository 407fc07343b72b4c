//! Error types for the relying-party flow.
//!
//! Every failure surfaced by [`OidcClient`](crate::client::OidcClient) is an
//! [`OidcError`]. The variants follow the four failure families of the flow
//! (configuration, protocol, token validation, network) plus cache
//! serialization failures.

use crate::config::ConfigError;
use crate::http::HttpError;
use crate::storage::CacheError;

/// Errors that can occur while running the authorization code flow.
#[derive(Debug, thiserror::Error)]
pub enum OidcError {
    /// The configuration is incomplete or insecure.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The redirect round trip or the token endpoint violated the protocol.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An ID token or one of its hash claims was rejected.
    #[error("Token validation failed: {0}")]
    TokenValidation(#[from] TokenValidationError),

    /// The HTTP gateway failed to deliver a response.
    #[error("Network error: {0}")]
    Network(#[from] HttpError),

    /// A cache entry could not be written.
    #[error("Storage error: {0}")]
    Storage(#[from] CacheError),
}

impl OidcError {
    /// Returns `true` if this is a configuration error.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns `true` if this is a protocol error.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Returns `true` if this is a token validation error.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::TokenValidation(_))
    }

    /// Returns `true` if this is a network error.
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Violations of the redirect/callback and token endpoint protocol.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The callback did not carry a `state` parameter.
    #[error("State expected from query params")]
    MissingState,

    /// The returned `state` does not match the cached one.
    #[error("Invalid state: callback state does not match the stored state")]
    StateMismatch,

    /// The callback did not carry an authorization code.
    #[error("No code found in query params")]
    MissingCode,

    /// The provider redirected back with an `error` parameter.
    #[error("Authorization failed: {error} - {description}")]
    AuthorizationDenied {
        /// The OAuth error code.
        error: String,
        /// Optional error description.
        description: String,
    },

    /// The token endpoint answered with an OAuth error body.
    #[error("Token endpoint error: {error} - {description}")]
    TokenEndpoint {
        /// The OAuth error code.
        error: String,
        /// Optional error description.
        description: String,
    },

    /// The token endpoint answered with something that is not a token response.
    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    /// No flow state was cached for the current login attempt.
    #[error("No flow state found for the current login attempt")]
    MissingFlowState,

    /// `refresh_tokens` was called without a cached refresh token.
    #[error("No refresh token available")]
    MissingRefreshToken,
}

impl ProtocolError {
    /// Creates an `AuthorizationDenied` error.
    #[must_use]
    pub fn authorization_denied(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::AuthorizationDenied {
            error: error.into(),
            description: description.into(),
        }
    }

    /// Creates a `TokenEndpoint` error.
    #[must_use]
    pub fn token_endpoint(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::TokenEndpoint {
            error: error.into(),
            description: description.into(),
        }
    }
}

/// ID token rejections. Each variant names the violated claim or check.
#[derive(Debug, thiserror::Error)]
pub enum TokenValidationError {
    /// The token is not a decodable three-part JWS.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// `iss` does not match the configured issuer.
    #[error("Invalid issuer, expected {expected} but got {actual}")]
    IssuerMismatch {
        /// The configured issuer.
        expected: String,
        /// The `iss` claim.
        actual: String,
    },

    /// The client id is not among the `aud` values.
    #[error("Invalid audience, expected {expected} but got {actual}")]
    AudienceMismatch {
        /// The configured client id.
        expected: String,
        /// The `aud` values, space separated.
        actual: String,
    },

    /// Multiple audiences were present without an `azp` claim.
    #[error("azp claim is required when multiple audiences are present")]
    MissingAzp,

    /// `azp` does not match the client id.
    #[error("Invalid azp claim: {0}")]
    InvalidAzp(String),

    /// The token is MAC-signed (HS256/384/512).
    #[error("MAC algorithms are not supported: {0}")]
    MacAlgorithm(String),

    /// The token is signed with anything other than RS256.
    #[error("Invalid algorithm {0}, only RS256 is supported")]
    UnsupportedAlgorithm(String),

    /// No key set is configured.
    #[error("No JWKS available to verify the token signature")]
    MissingJwks,

    /// The header `kid` matches no key in the key set.
    #[error("Invalid kid: no key found for {0}")]
    KeyNotFound(String),

    /// There was no `kid` and no key declares the header `alg`.
    #[error("There was no kid, and no JWK declares algorithm {0}")]
    NoKeyForAlgorithm(String),

    /// The JWK could not be turned into a verification key.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The JWS signature did not verify.
    #[error("Invalid signature")]
    InvalidSignature,

    /// `exp` is in the past.
    #[error("Token has expired")]
    Expired,

    /// `iat` is in the future.
    #[error("Token is not yet valid")]
    NotYetValid,

    /// A nonce was sent but the token carries none.
    #[error("Nonce is required")]
    MissingNonce,

    /// The token nonce is not the challenge of the sent nonce.
    #[error("Invalid nonce")]
    NonceMismatch,

    /// `max_age` was requested but `auth_time` is absent.
    #[error("auth_time required when max_age was requested")]
    MissingAuthTime,

    /// `auth_time` was returned but no `max_age` is known.
    #[error("max_age required when auth_time was returned")]
    MissingMaxAge,

    /// `auth_time + max_age` lies in the past.
    #[error("Max age was reached")]
    MaxAgeReached,

    /// `at_hash` does not match the access token.
    #[error("Invalid at_hash: access token does not match the ID token")]
    AtHashMismatch,

    /// `c_hash` does not match the authorization code.
    #[error("Invalid c_hash: authorization code does not match the ID token")]
    CHashMismatch,
}

impl TokenValidationError {
    /// Creates an `IssuerMismatch` error.
    #[must_use]
    pub fn issuer_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::IssuerMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Returns `true` if the error concerns the signature or signing key.
    #[must_use]
    pub fn is_signature_error(&self) -> bool {
        matches!(
            self,
            Self::MacAlgorithm(_)
                | Self::UnsupportedAlgorithm(_)
                | Self::MissingJwks
                | Self::KeyNotFound(_)
                | Self::NoKeyForAlgorithm(_)
                | Self::InvalidKey(_)
                | Self::InvalidSignature
        )
    }

    /// Returns `true` if the error concerns token lifetime.
    #[must_use]
    pub fn is_time_error(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::NotYetValid | Self::MaxAgeReached
        )
    }
}
