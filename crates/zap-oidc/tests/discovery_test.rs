//! Discovery document and key set loading, cache first.

mod common;

use common::*;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zap_oidc::discovery::discovery_url;
use zap_oidc::{
    AuthConfig, AuthenticationState, CacheKey, ConfigError, DiscoveryDocument, Event, FlowState,
    OidcError, QueryParams, ReqwestGateway, TokenValidationError,
};

fn document(issuer: &str) -> Value {
    json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/authorize"),
        "token_endpoint": format!("{issuer}/token"),
        "jwks_uri": format!("{issuer}/jwks"),
        "end_session_endpoint": format!("{issuer}/logout"),
        "check_session_iframe": format!("{issuer}/check-session"),
        "code_challenge_methods_supported": ["S256"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
    })
}

fn discovery_config() -> AuthConfig {
    AuthConfig::new(ISSUER, CLIENT_ID, REDIRECT_URI)
}

fn serve_provider(gateway: &MockGateway) {
    gateway.on_get(discovery_url(ISSUER), document(ISSUER));
    gateway.on_get(format!("{ISSUER}/jwks"), jwks_value());
}

#[tokio::test]
async fn test_fetches_and_caches_on_miss() {
    let h = Harness::new(APP_URL);
    serve_provider(&h.gateway);

    h.client.init_auth(discovery_config()).await.unwrap();

    assert_eq!(
        h.events(),
        vec![Event::DiscoveryDocumentLoaded, Event::JwksLoaded]
    );
    let urls: Vec<String> = h.gateway.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(
        urls,
        vec![
            "https://idp.example/.well-known/openid-configuration".to_string(),
            "https://idp.example/jwks".to_string(),
        ]
    );

    let snapshot = h.client.cache().get_all().unwrap();
    assert_eq!(snapshot.discovery_document.unwrap().issuer, ISSUER);
    assert_eq!(snapshot.jwks.unwrap().keys.len(), 1);

    let config = h.client.config().unwrap();
    assert_eq!(config.authorize_endpoint.as_deref(), Some("https://idp.example/authorize"));
    assert_eq!(config.token_endpoint.as_deref(), Some("https://idp.example/token"));
    assert_eq!(config.endsession_endpoint.as_deref(), Some("https://idp.example/logout"));
    assert_eq!(
        config.check_session_iframe.as_deref(),
        Some("https://idp.example/check-session")
    );
    assert!(config.jwks.is_some());

    let document = h.client.discovery_document().unwrap();
    assert!(document.supports_refresh_token());
    assert_eq!(h.client.auth_state(), AuthenticationState::Unauthenticated);
}

#[tokio::test]
async fn test_uses_cache_on_hit() {
    let first = Harness::new(APP_URL);
    serve_provider(&first.gateway);
    first.client.init_auth(discovery_config()).await.unwrap();

    let h = Harness::with_storage(first.storage.clone(), APP_URL);
    h.client.init_auth(discovery_config()).await.unwrap();

    assert!(h.gateway.requests().is_empty());
    assert!(h.events().is_empty());
    assert!(h.client.config().unwrap().jwks.is_some());

    h.client.login(QueryParams::new()).await.unwrap();
    assert!(
        h.platform
            .last_redirect()
            .unwrap()
            .starts_with("https://idp.example/authorize?")
    );
}

#[tokio::test]
async fn test_cached_document_is_revalidated() {
    let h = Harness::new(APP_URL);
    let stale: DiscoveryDocument = serde_json::from_value(document("https://old-idp.example")).unwrap();
    h.client
        .cache()
        .set(CacheKey::DiscoveryDocument, &stale)
        .unwrap();

    let err = h.client.init_auth(discovery_config()).await.unwrap_err();
    assert!(matches!(
        err,
        OidcError::Configuration(ConfigError::IssuerMismatch { ref actual, .. })
            if actual == "https://old-idp.example"
    ));
    assert!(h.gateway.requests().is_empty());
}

#[tokio::test]
async fn test_issuer_check_can_be_disabled() {
    let h = Harness::new(APP_URL);
    let issuer = "https://login.idp.example";
    h.gateway.on_get(discovery_url(ISSUER), document(issuer));
    h.gateway.on_get(format!("{issuer}/jwks"), jwks_value());

    let config = discovery_config().with_validate_discovery(false);
    h.client.init_auth(config).await.unwrap();
    assert_eq!(h.client.discovery_document().unwrap().issuer, issuer);
}

#[tokio::test]
async fn test_fetched_issuer_mismatch_is_not_cached() {
    let h = Harness::new(APP_URL);
    h.gateway
        .on_get(discovery_url(ISSUER), document("https://evil.example"));

    let err = h.client.init_auth(discovery_config()).await.unwrap_err();
    assert!(matches!(
        err,
        OidcError::Configuration(ConfigError::IssuerMismatch { .. })
    ));
    assert!(
        h.client
            .cache()
            .get::<DiscoveryDocument>(CacheKey::DiscoveryDocument)
            .is_none()
    );
    assert!(h.events().is_empty());
}

#[tokio::test]
async fn test_trailing_slash_issuer() {
    let h = Harness::new(APP_URL);
    let mut doc = document(ISSUER);
    doc["issuer"] = format!("{ISSUER}/").into();
    h.gateway.on_get(discovery_url(ISSUER), doc);
    h.gateway.on_get(format!("{ISSUER}/jwks"), jwks_value());

    let config = AuthConfig::new(ISSUER, CLIENT_ID, REDIRECT_URI);
    h.client.init_auth(config).await.unwrap();
}

#[tokio::test]
async fn test_null_document() {
    let h = Harness::new(APP_URL);
    h.gateway.on_get(discovery_url(ISSUER), Value::Null);

    let err = h.client.init_auth(discovery_config()).await.unwrap_err();
    assert!(matches!(
        err,
        OidcError::Configuration(ConfigError::MissingDiscoveryDocument)
    ));
}

#[tokio::test]
async fn test_unreachable_provider() {
    let h = Harness::new(APP_URL);
    let err = h.client.init_auth(discovery_config()).await.unwrap_err();
    assert!(err.is_network_error());
    assert!(h.client.config().is_none());
}

#[tokio::test]
async fn test_discovered_endpoints_must_be_https() {
    let h = Harness::new(APP_URL);
    let mut doc = document(ISSUER);
    doc["token_endpoint"] = "http://idp.example/token".into();
    h.gateway.on_get(discovery_url(ISSUER), doc);
    h.gateway.on_get(format!("{ISSUER}/jwks"), jwks_value());

    let err = h.client.init_auth(discovery_config()).await.unwrap_err();
    assert!(matches!(
        err,
        OidcError::Configuration(ConfigError::InsecureEndpoint { .. })
    ));
}

/// Logs in against a provider whose cached key set only holds `retired-key`,
/// then returns the page that receives the callback, with its token queued.
async fn callback_after_key_rotation() -> Harness {
    let login = Harness::new(APP_URL);
    let mut retired = jwks_value();
    retired["keys"][0]["kid"] = "retired-key".into();
    login.gateway.on_get(discovery_url(ISSUER), document(ISSUER));
    login.gateway.on_get(format!("{ISSUER}/jwks"), retired);
    login.client.init_auth(discovery_config()).await.unwrap();
    login.client.login(QueryParams::new()).await.unwrap();

    let state = query_param(&login.platform.last_redirect().unwrap(), "state").unwrap();
    let flow: FlowState = login.client.cache().get(CacheKey::AppState).unwrap();
    let nonce = challenge_of(flow.nonce.as_deref().unwrap());

    let callback = format!("{REDIRECT_URI}?code=abc&state={state}");
    let page = Harness::with_storage(login.storage.clone(), &callback);
    page.gateway.push_post(json!({
        "access_token": "at-1",
        "id_token": mint_id_token(&id_claims(Some(&nonce))),
    }));
    page
}

#[tokio::test]
async fn test_rotated_signing_key_is_refetched() {
    let h = callback_after_key_rotation().await;
    h.gateway.on_get(format!("{ISSUER}/jwks"), jwks_value());

    h.client.init_auth(discovery_config()).await.unwrap();

    assert_eq!(h.client.auth_state(), AuthenticationState::Authenticated);
    assert_eq!(h.events(), vec![Event::JwksLoaded, Event::AuthComplete]);
    let gets: Vec<String> = h
        .gateway
        .requests()
        .into_iter()
        .filter(|r| r.method == "GET")
        .map(|r| r.url)
        .collect();
    assert_eq!(gets, vec!["https://idp.example/jwks".to_string()]);

    let cached = h.client.cache().get_all().unwrap().jwks.unwrap();
    assert_eq!(cached.keys[0].common.key_id.as_deref(), Some(KID));
    let active = h.client.config().unwrap().jwks.unwrap();
    assert_eq!(active.keys[0].common.key_id.as_deref(), Some(KID));
}

#[tokio::test]
async fn test_unknown_signing_key_is_refetched_once() {
    let h = callback_after_key_rotation().await;
    let mut still_retired = jwks_value();
    still_retired["keys"][0]["kid"] = "retired-key".into();
    h.gateway.on_get(format!("{ISSUER}/jwks"), still_retired);

    let err = h.client.init_auth(discovery_config()).await.unwrap_err();

    assert!(matches!(
        err,
        OidcError::TokenValidation(TokenValidationError::KeyNotFound(ref kid)) if kid == KID
    ));
    assert_eq!(
        h.gateway
            .requests()
            .iter()
            .filter(|r| r.method == "GET")
            .count(),
        1
    );
    assert_eq!(h.client.auth_state(), AuthenticationState::Unauthenticated);
}

#[tokio::test]
async fn test_discovery_over_http() {
    let server = MockServer::start().await;
    let issuer = server.uri();

    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document(&issuer)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_value()))
        .expect(1)
        .mount(&server)
        .await;

    let storage = std::sync::Arc::new(zap_oidc::InMemoryStorage::new());
    let config = AuthConfig::new(&issuer, CLIENT_ID, "http://localhost:3000/cb").with_use_https(false);

    for _ in 0..2 {
        let client = zap_oidc::OidcClient::new(
            storage.clone(),
            std::sync::Arc::new(ReqwestGateway::with_defaults().unwrap()),
            std::sync::Arc::new(zap_oidc::RecordingPlatform::new("http://localhost:3000/")),
        );
        client.init_auth(config.clone()).await.unwrap();
        assert_eq!(
            client.config().unwrap().token_endpoint,
            Some(format!("{issuer}/token"))
        );
    }
}
