//! Signing key lookup in the provider key set.

use std::str::FromStr;

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};

use crate::error::TokenValidationError;

/// Finds the key that signed a token.
///
/// With a `kid` the key must carry that id. Without one, the first signing
/// key declaring the header `alg` is used.
///
/// # Errors
///
/// Returns `KeyNotFound` or `NoKeyForAlgorithm` when nothing matches.
pub fn find_signing_key<'a>(
    jwks: &'a JwkSet,
    kid: Option<&str>,
    alg: &str,
) -> Result<&'a Jwk, TokenValidationError> {
    if let Some(kid) = kid {
        return jwks
            .find(kid)
            .ok_or_else(|| TokenValidationError::KeyNotFound(kid.to_string()));
    }

    let wanted = Algorithm::from_str(alg).ok();
    jwks.keys
        .iter()
        .filter(|k| !matches!(&k.common.public_key_use, Some(PublicKeyUse::Encryption)))
        .find(|k| wanted.is_some() && jwk_algorithm(k) == wanted)
        .ok_or_else(|| TokenValidationError::NoKeyForAlgorithm(alg.to_string()))
}

/// Builds a verification key from a JWK.
///
/// # Errors
///
/// Returns `InvalidKey` if the JWK does not describe a usable public key.
pub fn decoding_key(jwk: &Jwk) -> Result<DecodingKey, TokenValidationError> {
    DecodingKey::from_jwk(jwk).map_err(|e| TokenValidationError::InvalidKey(e.to_string()))
}

/// Maps the declared JWK algorithm to a JWS algorithm.
fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}
