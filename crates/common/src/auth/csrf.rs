//! Anti-forgery `state` tokens for the authorization redirect.

use subtle::ConstantTimeEq;

use super::pkce::{random_urlsafe, ENTROPY_BYTES};
use crate::error::CommonResult;

/// Generates and validates opaque CSRF state tokens.
///
/// Holds no state itself; the expected value lives with the flow that issued
/// it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsrfStateGuard;

impl CsrfStateGuard {
    /// Generate a 32-byte random token, base64url encoded.
    ///
    /// # Errors
    /// Returns `CommonError::Entropy` if the OS random source fails.
    pub fn generate() -> CommonResult<String> {
        random_urlsafe(ENTROPY_BYTES)
    }

    /// Compare the issued and received tokens in constant time.
    #[must_use]
    pub fn validate(expected: &str, received: &str) -> bool {
        !expected.is_empty() && constant_time_eq(expected.as_bytes(), received.as_bytes())
    }
}

/// Constant-time byte comparison. Length mismatch returns `false`.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
