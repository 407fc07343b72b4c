//! ID token validation.
//!
//! Pure functions; the caller supplies the configuration (issuer, client id,
//! key set, clock skew) and the values remembered from the login attempt.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. structure (three base64url segments, JSON header and payload)
//! 2. `iss` equals the configured issuer, ignoring a trailing slash
//! 3. `aud` contains the client id; several audiences require `azp`
//! 4. `alg` is not a MAC algorithm and is exactly `RS256`
//! 5. signature, with the key selected by `kid` or else by `alg`
//! 6. `exp` and `iat` against now, widened by the clock skew
//! 7. `nonce` equals the challenge of the sent nonce
//! 8. `auth_time` and `max_age` as a pair
//!
//! All times are epoch seconds.

use std::collections::HashMap;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::codec::{self, base64url_encode, sha256};
use crate::config::{AuthConfig, trim_trailing_slash};
use crate::error::TokenValidationError;
use crate::jwks;
use crate::pkce::verify_challenge;

const MAC_ALGORITHMS: [&str; 3] = ["HS256", "HS384", "HS512"];

/// The only accepted signing algorithm.
pub const SUPPORTED_ALGORITHM: &str = "RS256";

/// Claims of an ID token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer.
    pub iss: String,

    /// Subject identifier.
    pub sub: String,

    /// Audiences; a space separated string is split.
    #[serde(deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at time (Unix timestamp).
    pub iat: i64,

    /// Time of authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,

    /// Nonce challenge echoed by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Authentication context class reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,

    /// Authentication methods references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amr: Option<Vec<String>>,

    /// Authorized party.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// Access token hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,

    /// Code hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_hash: Option<String>,

    /// Any other claims.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(s.split_whitespace().map(String::from).collect()),
        OneOrMany::Many(v) => Ok(v),
    }
}

/// Current time in epoch seconds.
#[must_use]
pub fn now_epoch() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Decodes the claims of a token without verifying anything.
///
/// # Errors
///
/// Returns `Malformed` if the token is not a decodable JWS or lacks a
/// required claim.
pub fn decode_claims(id_token: &str) -> Result<IdTokenClaims, TokenValidationError> {
    let jwt = codec::decode_jwt(id_token).map_err(|e| TokenValidationError::Malformed(e.to_string()))?;
    serde_json::from_value(jwt.payload).map_err(|e| TokenValidationError::Malformed(e.to_string()))
}

/// Validates an ID token against the configuration at the current time.
///
/// `nonce` is the verifier kept from the login attempt and `max_age` the
/// value requested from the provider.
///
/// # Errors
///
/// Returns the [`TokenValidationError`] naming the first violated check.
pub fn validate_id_token(
    id_token: &str,
    config: &AuthConfig,
    nonce: Option<&str>,
    max_age: Option<i64>,
) -> Result<IdTokenClaims, TokenValidationError> {
    validate_id_token_at(id_token, config, nonce, max_age, now_epoch())
}

/// Validates an ID token as of `now` (epoch seconds).
///
/// # Errors
///
/// Returns the [`TokenValidationError`] naming the first violated check.
pub fn validate_id_token_at(
    id_token: &str,
    config: &AuthConfig,
    nonce: Option<&str>,
    max_age: Option<i64>,
    now: i64,
) -> Result<IdTokenClaims, TokenValidationError> {
    let jwt = codec::decode_jwt(id_token).map_err(|e| TokenValidationError::Malformed(e.to_string()))?;
    let claims: IdTokenClaims = serde_json::from_value(jwt.payload)
        .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;

    validate_issuer(&claims, config)?;
    validate_audience(&claims, &config.client_id)?;
    validate_algorithm(&jwt.header.alg)?;
    verify_signature(
        id_token,
        config.jwks.as_ref(),
        jwt.header.kid.as_deref(),
        &jwt.header.alg,
    )?;

    let skew = i64::try_from(config.clock_skew.as_secs()).unwrap_or(i64::MAX);
    if claims.exp < now.saturating_sub(skew) {
        return Err(TokenValidationError::Expired);
    }
    if claims.iat > now.saturating_add(skew) {
        return Err(TokenValidationError::NotYetValid);
    }

    validate_nonce(&claims, nonce)?;
    // acr is accepted as-is.
    validate_auth_time(&claims, max_age, now)?;

    Ok(claims)
}

fn validate_issuer(claims: &IdTokenClaims, config: &AuthConfig) -> Result<(), TokenValidationError> {
    if config.trimmed_issuer() != trim_trailing_slash(&claims.iss) {
        return Err(TokenValidationError::issuer_mismatch(
            config.issuer.as_str(),
            claims.iss.as_str(),
        ));
    }
    Ok(())
}

fn validate_audience(claims: &IdTokenClaims, client_id: &str) -> Result<(), TokenValidationError> {
    if !claims.aud.iter().any(|a| a == client_id) {
        return Err(TokenValidationError::AudienceMismatch {
            expected: client_id.to_string(),
            actual: claims.aud.join(" "),
        });
    }

    if claims.aud.len() > 1 {
        match claims.azp.as_deref() {
            None => return Err(TokenValidationError::MissingAzp),
            Some(azp) if azp != client_id => {
                return Err(TokenValidationError::InvalidAzp(azp.to_string()));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn validate_algorithm(alg: &str) -> Result<(), TokenValidationError> {
    if MAC_ALGORITHMS.contains(&alg) {
        return Err(TokenValidationError::MacAlgorithm(alg.to_string()));
    }
    if alg != SUPPORTED_ALGORITHM {
        return Err(TokenValidationError::UnsupportedAlgorithm(alg.to_string()));
    }
    Ok(())
}

fn verify_signature(
    id_token: &str,
    jwks: Option<&JwkSet>,
    kid: Option<&str>,
    alg: &str,
) -> Result<(), TokenValidationError> {
    let jwks = jwks.ok_or(TokenValidationError::MissingJwks)?;
    let jwk = jwks::find_signing_key(jwks, kid, alg)?;
    let key = jwks::decoding_key(jwk)?;

    // Only the signature is checked here; claims are checked above and below.
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<Value>(id_token, &key, &validation).map_err(|e| match e.kind() {
        ErrorKind::InvalidSignature => TokenValidationError::InvalidSignature,
        _ => TokenValidationError::InvalidKey(e.to_string()),
    })?;
    Ok(())
}

fn validate_nonce(claims: &IdTokenClaims, sent: Option<&str>) -> Result<(), TokenValidationError> {
    let Some(sent) = sent else {
        return Ok(());
    };
    let received = claims
        .nonce
        .as_deref()
        .ok_or(TokenValidationError::MissingNonce)?;

    if !verify_challenge(sent, received) {
        return Err(TokenValidationError::NonceMismatch);
    }
    Ok(())
}

fn validate_auth_time(
    claims: &IdTokenClaims,
    max_age: Option<i64>,
    now: i64,
) -> Result<(), TokenValidationError> {
    match (claims.auth_time, max_age) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(TokenValidationError::MissingAuthTime),
        (Some(_), None) => Err(TokenValidationError::MissingMaxAge),
        (Some(auth_time), Some(max_age)) => {
            if auth_time.saturating_add(max_age) < now {
                Err(TokenValidationError::MaxAgeReached)
            } else {
                Ok(())
            }
        }
    }
}

/// Left half of the SHA-256 digest of `value`, base64url encoded.
#[must_use]
pub fn left_half_hash(value: &str) -> String {
    let digest = sha256(value.as_bytes());
    base64url_encode(&digest[..digest.len() / 2])
}

/// Checks the `at_hash` claim against the access token.
///
/// Passes when the claim is absent.
///
/// # Errors
///
/// Returns `Malformed` for an undecodable token and `AtHashMismatch` when the
/// claim does not match.
pub fn validate_at_hash(id_token: &str, access_token: &str) -> Result<(), TokenValidationError> {
    match decode_claims(id_token)?.at_hash {
        Some(claim) if claim != left_half_hash(access_token) => {
            Err(TokenValidationError::AtHashMismatch)
        }
        _ => Ok(()),
    }
}

/// Checks the `c_hash` claim against the authorization code.
///
/// Passes when the claim is absent.
///
/// # Errors
///
/// Returns `Malformed` for an undecodable token and `CHashMismatch` when the
/// claim does not match.
pub fn validate_c_hash(id_token: &str, code: &str) -> Result<(), TokenValidationError> {
    match decode_claims(id_token)?.c_hash {
        Some(claim) if claim != left_half_hash(code) => Err(TokenValidationError::CHashMismatch),
        _ => Ok(()),
    }
}
