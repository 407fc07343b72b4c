//! URL and request body construction.

use url::{Position, Url, form_urlencoded};

use crate::config::{AuthConfig, ConfigError, parse_url};
use crate::pkce::CHALLENGE_METHOD;
use crate::types::QueryParams;

/// Merges the base authorize parameters with configured and caller extras.
///
/// Order: `client_id`, `redirect_uri`, `response_type`, `scope`, then the
/// configured query parameters, then `extra`. A later key overrides an
/// earlier one in place.
#[must_use]
pub fn create_params_from_config(config: &AuthConfig, extra: &QueryParams) -> QueryParams {
    let mut params = QueryParams::new();
    params.insert("client_id".to_string(), config.client_id.clone());
    params.insert("redirect_uri".to_string(), config.redirect_uri.clone());
    params.insert(
        "response_type".to_string(),
        config.response_type.as_str().to_string(),
    );
    params.insert("scope".to_string(), config.scope.clone());

    for (key, value) in config.query_params.iter().chain(extra.iter()) {
        params.insert(key.clone(), value.clone());
    }
    params
}

/// Reads `max_age` from merged parameters, if present and numeric.
#[must_use]
pub fn max_age_from_params(params: &QueryParams) -> Option<i64> {
    params.get("max_age").and_then(|v| v.parse().ok())
}

/// Builds the authorize redirect URL.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if the endpoint is not a URL.
pub fn create_authorize_url(
    endpoint: &str,
    params: &QueryParams,
    code_challenge: &str,
) -> Result<String, ConfigError> {
    let mut url = parse_url("authorize_endpoint", endpoint)?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            query.append_pair(key, value);
        }
        query.append_pair("code_challenge", code_challenge);
        query.append_pair("code_challenge_method", CHALLENGE_METHOD);
    }
    Ok(url.into())
}

/// Form body of the authorization code exchange.
#[must_use]
pub fn create_token_request_body(config: &AuthConfig, code: &str, code_verifier: &str) -> String {
    form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", config.response_type.grant_type())
        .append_pair("code", code)
        .append_pair("code_verifier", code_verifier)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("client_id", &config.client_id)
        .finish()
}

/// Form body of the refresh token exchange.
#[must_use]
pub fn create_refresh_request_body(config: &AuthConfig, refresh_token: &str) -> String {
    form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "refresh_token")
        .append_pair("refresh_token", refresh_token)
        .append_pair("client_id", &config.client_id)
        .append_pair("scope", &config.scope)
        .finish()
}

/// Builds the end-session redirect URL. Without parameters the endpoint is
/// returned unchanged.
#[must_use]
pub fn create_logout_url(endpoint: &str, params: &QueryParams) -> String {
    if params.is_empty() {
        return endpoint.to_string();
    }
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish();
    format!("{endpoint}?{query}")
}

/// Parses a query string (with or without a leading `?`, or a full URL) into
/// ordered parameters.
#[must_use]
pub fn parse_query(input: &str) -> QueryParams {
    let query = match input.split_once('?') {
        Some((_, query)) => query,
        None => input,
    };
    let query = query.split('#').next().unwrap_or_default();
    form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// Returns `true` if `current_url` is the provider redirect: the URL without
/// query equals the redirect URI and both `code` and `state` are present.
#[must_use]
pub fn is_auth_callback(config: &AuthConfig, current_url: &str) -> bool {
    let (Ok(url), Ok(redirect)) = (Url::parse(current_url), Url::parse(&config.redirect_uri)) else {
        return false;
    };
    if url[..Position::AfterPath] != redirect[..Position::AfterPath] {
        return false;
    }

    let params = parse_query(url.query().unwrap_or_default());
    params.contains_key("code") && params.contains_key("state")
}
