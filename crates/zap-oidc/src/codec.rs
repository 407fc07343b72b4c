//! Encoding and hashing primitives.
//!
//! Base64url (RFC 4648 §5, unpadded), SHA-256 and structural JWT decoding.
//! Nothing here verifies a signature; see [`crate::validation`] for that.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Errors produced by the codec primitives.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The input is not valid base64url.
    #[error("Invalid base64url input: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A decoded segment is not valid JSON.
    #[error("Invalid JSON segment: {0}")]
    Json(#[from] serde_json::Error),

    /// The token does not have three dot-separated segments.
    #[error("Invalid JWT: expected 3 segments, got {0}")]
    InvalidStructure(usize),

    /// The blocking hash task was cancelled or panicked.
    #[error("Hash task failed: {0}")]
    TaskFailed(String),
}

/// Encodes bytes as unpadded base64url.
#[must_use]
pub fn base64url_encode(input: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

/// Decodes base64url, tolerating trailing `=` padding.
pub fn base64url_decode(input: &str) -> Result<Vec<u8>, CodecError> {
    Ok(URL_SAFE_NO_PAD.decode(input.trim_end_matches('='))?)
}

/// SHA-256 digest of the input.
#[must_use]
pub fn sha256(input: impl AsRef<[u8]>) -> [u8; 32] {
    Sha256::digest(input).into()
}

/// SHA-256 digest of the input as lowercase hex.
#[must_use]
pub fn sha256_hex(input: impl AsRef<[u8]>) -> String {
    hex::encode(sha256(input))
}

/// SHA-256 computed on the blocking pool.
///
/// Useful when hashing large inputs from within an async flow.
pub async fn sha256_async(input: impl Into<Vec<u8>>) -> Result<[u8; 32], CodecError> {
    let data = input.into();
    tokio::task::spawn_blocking(move || sha256(data))
        .await
        .map_err(|e| CodecError::TaskFailed(e.to_string()))
}

/// JOSE header of a JWS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    /// Signing algorithm, e.g. `RS256`.
    pub alg: String,

    /// Key id of the signing key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Token type, usually `JWT`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// A structurally decoded (but unverified) JWT.
#[derive(Debug, Clone)]
pub struct Jwt {
    /// The decoded header.
    pub header: JwtHeader,
    /// The decoded payload.
    pub payload: serde_json::Value,
    /// The raw signature segment.
    pub signature: String,
}

/// Splits a compact JWS into header, payload and signature and decodes the
/// first two segments.
pub fn decode_jwt(token: &str) -> Result<Jwt, CodecError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(CodecError::InvalidStructure(parts.len()));
    }

    let header: JwtHeader = serde_json::from_slice(&base64url_decode(parts[0])?)?;
    let payload: serde_json::Value = serde_json::from_slice(&base64url_decode(parts[1])?)?;

    Ok(Jwt {
        header,
        payload,
        signature: parts[2].to_string(),
    })
}
