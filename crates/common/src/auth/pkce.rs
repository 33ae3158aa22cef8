//! PKCE (Proof Key for Code Exchange) for OAuth 2.0
//!
//! Implements the S256 method of RFC 7636: the verifier is 32 random bytes
//! encoded as base64url without padding (43 characters), the challenge is
//! `BASE64URL(SHA256(ASCII(verifier)))`.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{CommonError, CommonResult};

/// Random bytes drawn for each verifier and state token.
pub const ENTROPY_BYTES: usize = 32;

/// Only supported challenge method.
pub const CHALLENGE_METHOD: &str = "S256";

/// RFC 7636 §4.1 verifier length bounds.
pub const MIN_VERIFIER_LEN: usize = 43;
/// Upper bound of the verifier length.
pub const MAX_VERIFIER_LEN: usize = 128;

/// Draw `len` bytes from the OS entropy source and encode them base64url.
///
/// # Errors
/// Returns `CommonError::Entropy` when the OS random source fails.
pub(crate) fn random_urlsafe(len: usize) -> CommonResult<String> {
    let mut bytes = vec![0u8; len];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| CommonError::entropy(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Verifier/challenge pair for one authorization attempt.
///
/// Never persisted; dropped once the code has been exchanged.
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// Secret sent only on the token exchange
    pub verifier: String,
    /// `BASE64URL(SHA256(verifier))`, sent on the authorization request
    pub challenge: String,
    /// Always [`CHALLENGE_METHOD`]
    pub method: &'static str,
}

impl fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .field("method", &self.method)
            .finish()
    }
}

/// Stateless PKCE generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PkceEngine;

impl PkceEngine {
    /// Generate a fresh verifier and its S256 challenge.
    ///
    /// # Errors
    /// Returns `CommonError::Entropy` if the OS random source fails. This is
    /// a process-level condition and should not be retried.
    pub fn generate() -> CommonResult<PkcePair> {
        let verifier = random_urlsafe(ENTROPY_BYTES)?;
        let challenge = Self::challenge_for(&verifier);
        Ok(PkcePair { verifier, challenge, method: CHALLENGE_METHOD })
    }

    /// Compute the S256 challenge for a verifier.
    #[must_use]
    pub fn challenge_for(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// Recompute the challenge for `pair` and compare it to `challenge`.
    ///
    /// Production verification happens on the authorization server; this is
    /// used against protocol vectors.
    #[must_use]
    pub fn verify(pair: &PkcePair, challenge: &str) -> bool {
        is_valid_verifier(&pair.verifier)
            && crate::auth::csrf::constant_time_eq(
                Self::challenge_for(&pair.verifier).as_bytes(),
                challenge.as_bytes(),
            )
    }
}

/// Check length (43..=128) and the unreserved charset `[A-Za-z0-9-._~]`.
#[must_use]
pub fn is_valid_verifier(verifier: &str) -> bool {
    (MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN).contains(&verifier.len())
        && verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}
