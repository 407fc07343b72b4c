//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use zap_oidc::codec::{base64url_encode, sha256};
use zap_oidc::validation::now_epoch;
use zap_oidc::{
    AuthConfig, AuthenticationState, Event, HttpError, HttpGateway, InMemoryStorage, OidcClient,
    RecordingPlatform,
};

pub const ISSUER: &str = "https://idp.example";
pub const CLIENT_ID: &str = "c1";
pub const REDIRECT_URI: &str = "https://app.example/cb";
pub const APP_URL: &str = "https://app.example/home";
pub const KID: &str = "test-key-1";

const PRIVATE_KEY: &[u8] = include_bytes!("../fixtures/rsa_private.pem");
const JWKS: &str = include_str!("../fixtures/jwks.json");

pub fn jwks() -> JwkSet {
    serde_json::from_str(JWKS).expect("fixture JWKS should parse")
}

pub fn jwks_value() -> Value {
    serde_json::from_str(JWKS).expect("fixture JWKS should parse")
}

/// Signs `claims` with the fixture key.
pub fn mint_id_token(claims: &Value) -> String {
    mint_with(Algorithm::RS256, Some(KID), claims)
}

pub fn mint_with(alg: Algorithm, kid: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(alg);
    header.kid = kid.map(String::from);
    let key = EncodingKey::from_rsa_pem(PRIVATE_KEY).expect("fixture key should load");
    jsonwebtoken::encode(&header, claims, &key).expect("token should sign")
}

/// Claims valid right now for the test client.
pub fn id_claims(nonce_challenge: Option<&str>) -> Value {
    let now = now_epoch();
    let mut claims = json!({
        "iss": ISSUER,
        "sub": "user-1",
        "aud": CLIENT_ID,
        "exp": now + 300,
        "iat": now,
    });
    if let Some(nonce) = nonce_challenge {
        claims["nonce"] = nonce.into();
    }
    claims
}

/// The challenge the provider would echo for a nonce verifier.
pub fn challenge_of(verifier: &str) -> String {
    base64url_encode(sha256(verifier))
}

/// Configuration with static endpoints, so no discovery round trip happens.
pub fn static_config() -> AuthConfig {
    AuthConfig::new(ISSUER, CLIENT_ID, REDIRECT_URI)
        .with_discovery(false)
        .with_authorize_endpoint(format!("{ISSUER}/authorize"))
        .with_token_endpoint(format!("{ISSUER}/token"))
        .with_endsession_endpoint(format!("{ISSUER}/logout"))
        .with_post_logout_redirect_uri("https://app.example/")
        .with_jwks(jwks())
}

/// Canned JSON responses keyed by URL for GET and queued for POST.
#[derive(Default)]
pub struct MockGateway {
    gets: Mutex<HashMap<String, Value>>,
    posts: Mutex<VecDeque<Value>>,
    requests: Mutex<Vec<Request>>,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: &'static str,
    pub url: String,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_get(&self, url: impl Into<String>, body: Value) {
        self.gets.lock().unwrap().insert(url.into(), body);
    }

    pub fn push_post(&self, body: Value) {
        self.posts.lock().unwrap().push_back(body);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, method: &'static str, url: &str, body: Option<String>, headers: &[(&str, &str)]) {
        self.requests.lock().unwrap().push(Request {
            method,
            url: url.to_string(),
            body,
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        });
    }
}

#[async_trait]
impl HttpGateway for MockGateway {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value, HttpError> {
        self.record("GET", url, None, headers);
        self.gets
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| HttpError::Network(format!("no route for {url}")))
    }

    async fn post(&self, url: &str, body: String, headers: &[(&str, &str)]) -> Result<Value, HttpError> {
        self.record("POST", url, Some(body), headers);
        self.posts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| HttpError::Network(format!("no response queued for {url}")))
    }
}

/// Everything a test needs to drive one page load.
pub struct Harness {
    pub storage: Arc<InMemoryStorage>,
    pub gateway: Arc<MockGateway>,
    pub platform: Arc<RecordingPlatform>,
    pub client: Arc<OidcClient>,
    pub states: Arc<Mutex<Vec<AuthenticationState>>>,
    pub events: Arc<Mutex<Vec<Event>>>,
}

impl Harness {
    pub fn new(url: &str) -> Self {
        Self::with_storage(Arc::new(InMemoryStorage::new()), url)
    }

    /// A fresh client over existing storage, like a reload of the page.
    pub fn with_storage(storage: Arc<InMemoryStorage>, url: &str) -> Self {
        let gateway = MockGateway::new();
        let platform = Arc::new(RecordingPlatform::new(url));
        let client = Arc::new(OidcClient::new(
            storage.clone(),
            gateway.clone(),
            platform.clone(),
        ));

        let states = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = states.clone();
        client
            .events()
            .on_state_change(move |s| sink.lock().unwrap().push(s));
        let sink = events.clone();
        client
            .events()
            .on_event(move |e| sink.lock().unwrap().push(e));

        Self {
            storage,
            gateway,
            platform,
            client,
            states,
            events,
        }
    }

    pub fn states(&self) -> Vec<AuthenticationState> {
        self.states.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: Event) -> usize {
        self.events().iter().filter(|e| **e == event).count()
    }

    pub fn reset_records(&self) {
        self.states.lock().unwrap().clear();
        self.events.lock().unwrap().clear();
    }
}

/// Query parameter `name` of `url`.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Runs login and a successful callback; returns the authenticated harness.
pub async fn authenticated(config: &AuthConfig, refresh_token: Option<&str>) -> Harness {
    let login = Harness::new(APP_URL);
    login.client.init_auth(config.clone()).await.unwrap();
    login.client.login(Default::default()).await.unwrap();

    let state = query_param(&login.platform.last_redirect().unwrap(), "state").unwrap();
    let flow = login
        .client
        .cache()
        .get::<zap_oidc::FlowState>(zap_oidc::CacheKey::AppState)
        .unwrap();
    let nonce = challenge_of(flow.nonce.as_deref().unwrap());

    let callback = format!("{REDIRECT_URI}?code=abc&state={state}&session_state=ss1");
    let page = Harness::with_storage(login.storage.clone(), &callback);
    let mut tokens = json!({
        "access_token": "at-1",
        "id_token": mint_id_token(&id_claims(Some(&nonce))),
        "token_type": "Bearer",
        "expires_in": 300,
    });
    if let Some(refresh_token) = refresh_token {
        tokens["refresh_token"] = refresh_token.into();
    }
    page.gateway.push_post(tokens);
    page.client.init_auth(config.clone()).await.unwrap();
    page
}
