//! PKCE (Proof Key for Code Exchange) and nonce generation.
//!
//! Implements RFC 7636 with the S256 method only. The same verifier/challenge
//! construction binds the OIDC `nonce`: the provider receives the challenge,
//! the client keeps the verifier, and the ID token must echo the challenge.
//!
//! # Example
//!
//! ```
//! use zap_oidc::pkce::{PkceChallenge, PkceVerifier, verify_challenge};
//!
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier);
//!
//! assert!(verify_challenge(verifier.as_str(), challenge.as_str()));
//! ```

use rand::RngCore;
use rand::rngs::OsRng;

use crate::codec::{base64url_encode, sha256};

/// Random bytes behind a PKCE code verifier (43 base64url characters).
pub const VERIFIER_BYTES: usize = 32;

/// Random bytes behind the `state` parameter and the nonce.
pub const STATE_BYTES: usize = 42;

/// The only supported challenge method.
pub const CHALLENGE_METHOD: &str = "S256";

/// Errors that can occur during PKCE operations.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside the valid range (43-128 characters).
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains invalid characters.
    #[error("Invalid verifier characters: must be URL-safe base64 ([A-Za-z0-9-._~])")]
    InvalidVerifierCharacters,
}

/// Returns `len` cryptographically secure random bytes.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Creates a base64url nonce from `len` random bytes.
#[must_use]
pub fn create_nonce(len: usize) -> String {
    base64url_encode(random_bytes(len))
}

/// PKCE code verifier.
///
/// A high-entropy random string over `[A-Za-z0-9-._~]`, 43 to 128
/// characters long (RFC 7636 §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Create a verifier from an existing string.
    ///
    /// # Errors
    ///
    /// Returns an error if the length is not 43-128 characters or the string
    /// contains characters other than `[A-Za-z0-9-._~]`.
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        let len = verifier.len();
        if !(43..=128).contains(&len) {
            return Err(PkceError::InvalidVerifierLength(len));
        }

        if !verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
        {
            return Err(PkceError::InvalidVerifierCharacters);
        }

        Ok(Self(verifier))
    }

    /// Generate a verifier from [`VERIFIER_BYTES`] random bytes.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_with_len(VERIFIER_BYTES)
    }

    /// Generate a verifier from `len` random bytes.
    ///
    /// `len` must be at least 32 for the result to be a valid RFC 7636
    /// verifier.
    #[must_use]
    pub fn generate_with_len(len: usize) -> Self {
        Self(create_nonce(len))
    }

    /// Get the verifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the verifier and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for PkceVerifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// S256 code challenge: `BASE64URL(SHA256(ASCII(code_verifier)))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// Derive the challenge of a verifier.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        Self(challenge_of(verifier.as_str()))
    }

    /// Get the challenge as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the challenge and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for PkceChallenge {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A freshly generated verifier together with its challenge.
#[derive(Debug, Clone)]
pub struct VerifierChallengePair {
    /// Kept by the client.
    pub verifier: PkceVerifier,
    /// Sent to the provider.
    pub challenge: PkceChallenge,
}

impl VerifierChallengePair {
    /// Generate a pair whose verifier is built from `len` random bytes.
    #[must_use]
    pub fn generate(len: usize) -> Self {
        let verifier = PkceVerifier::generate_with_len(len);
        let challenge = PkceChallenge::from_verifier(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

fn challenge_of(verifier: &str) -> String {
    base64url_encode(sha256(verifier.as_bytes()))
}

/// Returns `true` iff `challenge == base64url(sha256(verifier))`.
#[must_use]
pub fn verify_challenge(verifier: &str, challenge: &str) -> bool {
    challenge_of(verifier) == challenge.trim_end_matches('=')
}
