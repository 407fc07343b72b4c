//! Data carried through the flow and persisted in the cache.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered query parameters; later insertions override earlier keys in place.
pub type QueryParams = IndexMap<String, String>;

/// Tokens returned by the token endpoint.
///
/// Produced once per code exchange or refresh and persisted as a single
/// cache entry. A refresh replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    /// The access token.
    pub access_token: String,

    /// The ID token (JWT).
    pub id_token: String,

    /// Optional refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Access token lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// The token type (usually "Bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Per-login-attempt state.
///
/// Created by `login`, read back at callback time and kept for the life of
/// the session so that later validations can re-derive `nonce` and
/// `max_age`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowState {
    /// The nonce verifier; the provider received its challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// The PKCE code verifier.
    pub code_verifier: String,

    /// The URL the user started the login from.
    pub send_user_back_to: String,

    /// `max_age` requested from the provider, in seconds.
    #[serde(rename = "max_age", default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,

    /// The authorize parameters merged from configuration and the caller.
    #[serde(default)]
    pub params: QueryParams,
}
