//! The authorization code flow controller.
//!
//! [`OidcClient`] drives login, callback processing, token refresh and
//! logout. It owns the flow state and tokens in the session cache and is the
//! only writer of the [`AuthenticationState`].
//!
//! # State machine
//!
//! ```text
//! Unauthenticated --login / callback--> Authenticating
//! Authenticating  --tokens valid------> Authenticated
//! Authenticating  --any failure-------> Unauthenticated
//! Authenticated   --logout------------> Unauthenticated
//! ```
//!
//! # Concurrency
//!
//! `login`, callback processing, `refresh_tokens`, silent renew and both
//! logouts serialize through one in-flight-flow guard, so two flows never
//! interleave their cache writes. A second caller waits for the first.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use zap_oidc::{AuthConfig, OidcClient, InMemoryStorage, ReqwestGateway, RecordingPlatform};
//!
//! let client = OidcClient::new(
//!     Arc::new(InMemoryStorage::new()),
//!     Arc::new(ReqwestGateway::with_defaults()?),
//!     Arc::new(RecordingPlatform::new("https://app.example/")),
//! );
//! client
//!     .init_auth(AuthConfig::new("https://idp.example", "spa", "https://app.example/cb"))
//!     .await?;
//! client.login(Default::default()).await?;
//! ```

pub mod params;
pub mod session;

use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::{AuthConfig, ConfigError};
use crate::discovery::{DiscoveryDocument, DiscoveryService};
use crate::error::{OidcError, ProtocolError, TokenValidationError};
use crate::events::{AuthStateStore, AuthenticationState, Event};
use crate::http::{self, HttpGateway};
use crate::pkce::{CHALLENGE_METHOD, STATE_BYTES, VERIFIER_BYTES, VerifierChallengePair, create_nonce};
use crate::platform::BrowserPlatform;
use crate::storage::{CacheKey, StorageCache, StorageMedium};
use crate::types::{AuthResult, FlowState, QueryParams};
use crate::validation::{IdTokenClaims, decode_claims, validate_at_hash, validate_c_hash, validate_id_token};

pub use session::SessionMonitor;

/// OAuth error body returned by the token endpoint.
#[derive(Debug, serde::Deserialize)]
struct OAuthErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Relying-party client for the authorization code flow with PKCE.
pub struct OidcClient {
    config: RwLock<Option<AuthConfig>>,
    discovery_document: RwLock<Option<DiscoveryDocument>>,
    cache: StorageCache,
    http: Arc<dyn HttpGateway>,
    platform: Arc<dyn BrowserPlatform>,
    events: Arc<AuthStateStore>,
    discovery: DiscoveryService,
    flow_lock: Mutex<()>,
}

impl std::fmt::Debug for OidcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcClient")
            .field("state", &self.auth_state())
            .finish_non_exhaustive()
    }
}

impl OidcClient {
    /// Creates a client over the host's storage, transport and page.
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageMedium>,
        http: Arc<dyn HttpGateway>,
        platform: Arc<dyn BrowserPlatform>,
    ) -> Self {
        let cache = StorageCache::new(storage);
        let events = Arc::new(AuthStateStore::new());
        let discovery = DiscoveryService::new(cache.clone(), http.clone(), events.clone());

        Self {
            config: RwLock::new(None),
            discovery_document: RwLock::new(None),
            cache,
            http,
            platform,
            events,
            discovery,
            flow_lock: Mutex::new(()),
        }
    }

    /// Current authentication state.
    #[must_use]
    pub fn auth_state(&self) -> AuthenticationState {
        self.events.state()
    }

    /// The event bus, for registering handlers.
    #[must_use]
    pub fn events(&self) -> &AuthStateStore {
        &self.events
    }

    /// The active configuration, once `init_auth` has accepted it.
    #[must_use]
    pub fn config(&self) -> Option<AuthConfig> {
        self.config.read().ok().and_then(|c| c.clone())
    }

    /// The discovery document resolved by `init_auth`, if discovery is enabled.
    #[must_use]
    pub fn discovery_document(&self) -> Option<DiscoveryDocument> {
        self.discovery_document.read().ok().and_then(|d| d.clone())
    }

    /// The session cache.
    #[must_use]
    pub fn cache(&self) -> &StorageCache {
        &self.cache
    }

    /// Initializes the client and runs the auth flow for the current URL.
    ///
    /// With discovery enabled the provider endpoints, key set, end-session
    /// endpoint and check-session iframe are merged into `config` first.
    /// On the redirect URI with `code` and `state` the callback is processed;
    /// anywhere else the cached ID token decides the state without any
    /// network call.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an incomplete or insecure
    /// configuration, a network error for failed discovery, or any error of
    /// callback processing.
    pub async fn init_auth(&self, mut config: AuthConfig) -> Result<(), OidcError> {
        config.validate()?;

        if config.discovery {
            let document = self.discovery.load_discovery_document(&config).await?;
            merge_discovery(&mut config, &document);

            if !document.supports_pkce_method(CHALLENGE_METHOD) {
                tracing::warn!(
                    "Provider {} does not advertise PKCE method {}",
                    document.issuer,
                    CHALLENGE_METHOD
                );
            }
            if let Ok(mut slot) = self.discovery_document.write() {
                *slot = Some(document);
            }
        }

        config.require_endpoints()?;
        if config.use_https {
            config.check_https()?;
        }

        if let Ok(mut slot) = self.config.write() {
            *slot = Some(config.clone());
        }

        self.run_auth_flow(&config).await
    }

    /// Starts a login: stores fresh flow state and redirects to the provider.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `init_auth` has not succeeded, or a
    /// storage error if the flow state cannot be cached.
    pub async fn login(&self, extra: QueryParams) -> Result<(), OidcError> {
        let config = self.active_config()?;
        let _guard = self.flow_lock.lock().await;

        self.remove_local_session();
        self.events
            .set_auth_state(AuthenticationState::Unauthenticated);

        let state = create_nonce(STATE_BYTES);
        let nonce = VerifierChallengePair::generate(STATE_BYTES);
        let pkce = VerifierChallengePair::generate(VERIFIER_BYTES);
        let mut auth_params = params::create_params_from_config(&config, &extra);

        let flow = FlowState {
            nonce: Some(nonce.verifier.as_str().to_string()),
            code_verifier: pkce.verifier.as_str().to_string(),
            send_user_back_to: self.platform.current_url(),
            max_age: params::max_age_from_params(&auth_params),
            params: auth_params.clone(),
        };
        self.cache.set(CacheKey::State, &state)?;
        self.cache.set(CacheKey::AppState, &flow)?;

        auth_params.insert("state".to_string(), state);
        auth_params.insert("nonce".to_string(), nonce.challenge.into_inner());
        if config.requests_offline_access()
            && !config.disable_refresh_token_consent
            && !auth_params.contains_key("prompt")
        {
            auth_params.insert("prompt".to_string(), "consent".to_string());
        }

        let endpoint = config
            .authorize_endpoint
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("authorize_endpoint".to_string()))?;
        let url = params::create_authorize_url(endpoint, &auth_params, pkce.challenge.as_str())?;

        self.events
            .set_auth_state(AuthenticationState::Authenticating);
        self.events.emit_event(Event::AuthStarted);

        tracing::debug!("Redirecting to authorization endpoint {}", endpoint);
        self.platform.redirect_to(&url);
        Ok(())
    }

    /// The cached access token.
    #[must_use]
    pub fn get_access_token(&self) -> Option<String> {
        self.cached_auth_result().map(|r| r.access_token)
    }

    /// The cached refresh token.
    #[must_use]
    pub fn get_refresh_token(&self) -> Option<String> {
        self.cached_auth_result().and_then(|r| r.refresh_token)
    }

    /// The cached ID token, or `None` if it no longer validates.
    #[must_use]
    pub fn get_id_token(&self) -> Option<String> {
        let config = self.active_config().ok()?;
        let result = self.cached_auth_result()?;
        self.has_valid_id_token(&config, &result.id_token)
            .then_some(result.id_token)
    }

    /// Exchanges the cached refresh token for new tokens.
    ///
    /// On failure the cached session and the authentication state are left
    /// as they were.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::MissingRefreshToken` without a cached refresh
    /// token, the token endpoint error, or the validation error of the new
    /// ID token.
    pub async fn refresh_tokens(&self) -> Result<(), OidcError> {
        let config = self.active_config()?;
        let _guard = self.flow_lock.lock().await;

        let refresh_token = self
            .cached_auth_result()
            .and_then(|r| r.refresh_token)
            .ok_or(ProtocolError::MissingRefreshToken)?;

        let body = params::create_refresh_request_body(&config, &refresh_token);
        let result = self.request_tokens(&config, body).await?;

        validate_at_hash(&result.id_token, &result.access_token)?;

        let mut flow = self.cache.get::<FlowState>(CacheKey::AppState);
        let has_nonce = decode_claims(&result.id_token)?.nonce.is_some();
        let nonce = if has_nonce {
            flow.as_ref().and_then(|f| f.nonce.clone())
        } else {
            None
        };
        let max_age = flow.as_ref().and_then(|f| f.max_age);
        self.validate_signed_id_token(&config, &result.id_token, nonce.as_deref(), max_age)
            .await?;

        // Later validations of this token must not expect a nonce it lacks.
        if let Some(flow) = flow.as_mut()
            && !has_nonce
            && flow.nonce.take().is_some()
        {
            self.cache.set(CacheKey::AppState, &*flow)?;
        }
        self.cache.set(CacheKey::AuthResult, &result)?;
        self.events.emit_event(Event::TokensRefreshed);

        tracing::info!("Tokens refreshed");
        Ok(())
    }

    /// Discards the local session and redirects to the post-logout URI.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `init_auth` has not succeeded.
    pub async fn local_logout(&self) -> Result<(), OidcError> {
        let config = self.active_config()?;
        let _guard = self.flow_lock.lock().await;

        self.cache.clear();
        self.events
            .set_auth_state(AuthenticationState::Unauthenticated);
        self.events.emit_event(Event::Logout);

        tracing::info!("Local logout");
        if !config.post_logout_redirect_uri.is_empty() {
            self.platform.redirect_to(&config.post_logout_redirect_uri);
        }
        Ok(())
    }

    /// Discards the local session and redirects to the end-session endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no end-session endpoint is known.
    pub async fn logout(&self, extra: QueryParams) -> Result<(), OidcError> {
        let config = self.active_config()?;
        let endpoint = config
            .endsession_endpoint
            .clone()
            .ok_or_else(|| ConfigError::Missing("endsession_endpoint".to_string()))?;
        let _guard = self.flow_lock.lock().await;

        let mut query = QueryParams::new();
        if let Some(result) = self.cached_auth_result() {
            query.insert("id_token_hint".to_string(), result.id_token);
        }
        query.extend(extra);

        self.cache.clear();
        self.events
            .set_auth_state(AuthenticationState::Unauthenticated);
        self.events.emit_event(Event::Logout);

        tracing::info!("Logging out at {}", endpoint);
        self.platform
            .redirect_to(&params::create_logout_url(&endpoint, &query));
        Ok(())
    }

    pub(crate) fn active_config(&self) -> Result<AuthConfig, OidcError> {
        self.config()
            .ok_or_else(|| ConfigError::Missing("auth config (call init_auth first)".to_string()).into())
    }

    async fn run_auth_flow(&self, config: &AuthConfig) -> Result<(), OidcError> {
        let url = self.platform.current_url();

        if !params::is_auth_callback(config, &url) {
            let authenticated = self
                .cached_auth_result()
                .is_some_and(|r| self.has_valid_id_token(config, &r.id_token));
            self.events.set_auth_state(if authenticated {
                AuthenticationState::Authenticated
            } else {
                AuthenticationState::Unauthenticated
            });
            return Ok(());
        }

        let _guard = self.flow_lock.lock().await;
        let query = params::parse_query(&url);

        // A forged callback must not disturb the current session.
        self.check_state(&query)?;

        self.events
            .set_auth_state(AuthenticationState::Authenticating);

        match self.complete_callback(config, &query).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "Rejected authorization callback");
                self.remove_local_session();
                self.events
                    .set_auth_state(AuthenticationState::Unauthenticated);
                Err(e)
            }
        }
    }

    async fn complete_callback(&self, config: &AuthConfig, query: &QueryParams) -> Result<(), OidcError> {
        let code = authorization_code(query)?;
        self.platform.replace_url_state(&config.redirect_uri);

        let (result, flow) = self.redeem_code(config, code).await?;
        self.store_tokens(&result, query)?;

        if config.preserve_route && !flow.send_user_back_to.is_empty() {
            self.platform.replace_url_state(&flow.send_user_back_to);
        }

        self.events
            .set_auth_state(AuthenticationState::Authenticated);
        self.events.emit_event(Event::AuthComplete);

        tracing::info!("Authentication complete");
        Ok(())
    }

    /// Exchanges a code and validates the result against the cached flow state.
    pub(crate) async fn redeem_code(
        &self,
        config: &AuthConfig,
        code: &str,
    ) -> Result<(AuthResult, FlowState), OidcError> {
        let flow = self
            .cache
            .get::<FlowState>(CacheKey::AppState)
            .ok_or(ProtocolError::MissingFlowState)?;

        let body = params::create_token_request_body(config, code, &flow.code_verifier);
        let result = self.request_tokens(config, body).await?;

        validate_c_hash(&result.id_token, code)?;
        validate_at_hash(&result.id_token, &result.access_token)?;
        self.validate_signed_id_token(config, &result.id_token, flow.nonce.as_deref(), flow.max_age)
            .await?;

        Ok((result, flow))
    }

    /// Validates a freshly issued ID token. When its `kid` is missing from
    /// the cached key set and the key set came from discovery, the key set is
    /// fetched again once and validation is retried.
    async fn validate_signed_id_token(
        &self,
        config: &AuthConfig,
        id_token: &str,
        nonce: Option<&str>,
        max_age: Option<i64>,
    ) -> Result<IdTokenClaims, OidcError> {
        let kid = match validate_id_token(id_token, config, nonce, max_age) {
            Err(TokenValidationError::KeyNotFound(kid)) => kid,
            other => return Ok(other?),
        };
        let Some(jwks_uri) = self.discovery_document().map(|d| d.jwks_uri) else {
            return Err(TokenValidationError::KeyNotFound(kid).into());
        };

        tracing::info!(kid = %kid, "Signing key not in cached JWKS, refetching {}", jwks_uri);
        let jwks = self.discovery.fetch_jwks(&jwks_uri).await?;

        if let Ok(mut slot) = self.config.write()
            && let Some(active) = slot.as_mut()
        {
            active.jwks = Some(jwks.clone());
        }
        if let Ok(mut slot) = self.discovery_document.write()
            && let Some(document) = slot.as_mut()
        {
            document.jwks = Some(jwks.clone());
        }

        let mut config = config.clone();
        config.jwks = Some(jwks);
        Ok(validate_id_token(id_token, &config, nonce, max_age)?)
    }

    pub(crate) fn store_tokens(&self, result: &AuthResult, query: &QueryParams) -> Result<(), OidcError> {
        self.cache.set(CacheKey::AuthResult, result)?;
        if let Some(session_state) = query.get("session_state") {
            self.cache.set(CacheKey::SessionState, session_state)?;
        }
        Ok(())
    }

    async fn request_tokens(&self, config: &AuthConfig, body: String) -> Result<AuthResult, OidcError> {
        let endpoint = config
            .token_endpoint
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("token_endpoint".to_string()))?;

        tracing::debug!("Requesting tokens from {}", endpoint);
        let value = http::post_form(self.http.as_ref(), endpoint, body).await?;
        parse_token_response(value)
    }

    pub(crate) fn check_state(&self, query: &QueryParams) -> Result<(), ProtocolError> {
        let returned = query.get("state").ok_or(ProtocolError::MissingState)?;
        let stored = self.cache.get::<String>(CacheKey::State);

        if stored.as_ref() != Some(returned) {
            tracing::warn!("Callback state does not match the stored state");
            return Err(ProtocolError::StateMismatch);
        }
        Ok(())
    }

    fn cached_auth_result(&self) -> Option<AuthResult> {
        self.cache.get(CacheKey::AuthResult)
    }

    fn has_valid_id_token(&self, config: &AuthConfig, id_token: &str) -> bool {
        let flow = self.cache.get::<FlowState>(CacheKey::AppState);
        let nonce = flow.as_ref().and_then(|f| f.nonce.as_deref());
        let max_age = flow.as_ref().and_then(|f| f.max_age);

        match validate_id_token(id_token, config, nonce, max_age) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Cached ID token is not valid");
                false
            }
        }
    }

    fn remove_local_session(&self) {
        for key in [
            CacheKey::State,
            CacheKey::AppState,
            CacheKey::AuthResult,
            CacheKey::SessionState,
        ] {
            self.cache.remove(key);
        }
    }
}

/// Endpoints from discovery win; optional endpoints are only filled in.
fn merge_discovery(config: &mut AuthConfig, document: &DiscoveryDocument) {
    config.authorize_endpoint = Some(document.authorization_endpoint.clone());
    config.token_endpoint = Some(document.token_endpoint.clone());
    config.jwks.clone_from(&document.jwks);

    if config.endsession_endpoint.is_none() {
        config.endsession_endpoint.clone_from(&document.end_session_endpoint);
    }
    if config.check_session_iframe.is_none() {
        config.check_session_iframe.clone_from(&document.check_session_iframe);
    }
}

/// Extracts the code of a callback, surfacing a provider `error` first.
pub(crate) fn authorization_code(query: &QueryParams) -> Result<&str, ProtocolError> {
    if let Some(error) = query.get("error") {
        let description = query
            .get("error_description")
            .cloned()
            .unwrap_or_default();
        return Err(ProtocolError::authorization_denied(error.as_str(), description));
    }
    query
        .get("code")
        .map(String::as_str)
        .ok_or(ProtocolError::MissingCode)
}

fn parse_token_response(value: Value) -> Result<AuthResult, OidcError> {
    if value.get("error").is_some()
        && let Ok(oauth_error) = serde_json::from_value::<OAuthErrorResponse>(value.clone())
    {
        tracing::warn!(error = %oauth_error.error, "Token endpoint returned an error");
        return Err(ProtocolError::token_endpoint(
            oauth_error.error,
            oauth_error.error_description.unwrap_or_default(),
        )
        .into());
    }

    serde_json::from_value(value)
        .map_err(|e| ProtocolError::InvalidTokenResponse(e.to_string()).into())
}
