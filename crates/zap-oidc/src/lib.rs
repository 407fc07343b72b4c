//! # zap-oidc
//!
//! OpenID Connect relying-party client for the authorization code flow with
//! PKCE, written for single-page applications.
//!
//! This crate provides:
//! - Authorize URL construction with `state`, a hashed `nonce` and PKCE (S256)
//! - Callback processing and authorization code exchange
//! - Discovery document and JWKS acquisition, cached in the session cache
//! - ID token validation (issuer, audience, RS256 signature, lifetime,
//!   nonce, `auth_time`/`max_age`, `at_hash`/`c_hash`)
//! - Refresh token exchange, local and provider logout
//! - Session Management: check-session polling and silent renew
//!
//! ## Overview
//!
//! The host injects three capabilities: a key/value [`StorageMedium`], an
//! [`HttpGateway`] and a [`BrowserPlatform`]. [`OidcClient`] drives the flow
//! on top of them and publishes state changes and lifecycle events through
//! its [`AuthStateStore`].
//!
//! ## Modules
//!
//! - [`client`] - Flow controller, URL builders and session monitor
//! - [`config`] - Relying-party configuration
//! - [`discovery`] - Provider metadata and key set acquisition
//! - [`validation`] - ID token and hash claim validation
//! - [`jwks`] - Signing key lookup
//! - [`events`] - Authentication state and lifecycle events
//! - [`storage`] - Namespaced session cache
//! - [`http`] - HTTP gateway contract and reqwest implementation
//! - [`platform`] - Browser adapter contract
//! - [`pkce`] - PKCE and nonce generation
//! - [`codec`] - Base64url, SHA-256 and JWT decoding

pub mod client;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod http;
pub mod jwks;
pub mod pkce;
pub mod platform;
pub mod storage;
pub mod types;
pub mod validation;

pub use client::{OidcClient, SessionMonitor};
pub use config::{AuthConfig, ConfigError, ResponseType};
pub use discovery::{DiscoveryDocument, DiscoveryService};
pub use error::{OidcError, ProtocolError, TokenValidationError};
pub use events::{AuthStateStore, AuthenticationState, Event};
pub use http::{HttpError, HttpGateway, HttpGatewayConfig, ReqwestGateway};
pub use platform::{BrowserPlatform, RecordingPlatform, WindowMessage};
pub use storage::{CacheError, CacheKey, CacheSnapshot, InMemoryStorage, StorageCache, StorageMedium};
pub use types::{AuthResult, FlowState, QueryParams};
pub use validation::{IdTokenClaims, validate_at_hash, validate_c_hash, validate_id_token};
