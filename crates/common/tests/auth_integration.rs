//! Integration tests for the auth primitives
//!
//! Exercises PKCE, CSRF state and redaction through the crate's public
//! re-exports the way the authorization flow engine consumes them.

#![cfg(feature = "foundation")]

use tokenlink_common::auth::is_valid_verifier;
use tokenlink_common::{redact_token, CsrfStateGuard, PkceEngine};

/// Validates a full authorize-then-exchange round for PKCE.
///
/// # Test Steps
/// 1. Generate a pair and a state token for one attempt
/// 2. Simulate the server storing the challenge from the authorize request
/// 3. Simulate the server checking the verifier sent on the exchange
/// 4. Confirm a verifier from a different attempt is rejected
#[test]
fn test_pkce_binds_exchange_to_authorize_request() {
    let pair = PkceEngine::generate().expect("entropy available");
    let stored_challenge = pair.challenge.clone();

    assert!(is_valid_verifier(&pair.verifier));
    assert!(PkceEngine::verify(&pair, &stored_challenge));

    let other = PkceEngine::generate().expect("entropy available");
    assert!(!PkceEngine::verify(&other, &stored_challenge));
}

/// Validates the callback state check rejects forged or replayed values.
///
/// # Test Steps
/// 1. Issue a state for attempt A and one for attempt B
/// 2. Confirm A's callback validates only against A's state
#[test]
fn test_state_tokens_are_attempt_specific() {
    let a = CsrfStateGuard::generate().expect("entropy available");
    let b = CsrfStateGuard::generate().expect("entropy available");

    assert!(CsrfStateGuard::validate(&a, &a));
    assert!(!CsrfStateGuard::validate(&a, &b));
    assert!(!CsrfStateGuard::validate(&b, &a));
}

#[test]
fn test_redaction_never_reveals_generated_secrets() {
    let pair = PkceEngine::generate().expect("entropy available");
    let rendered = redact_token(&pair.verifier);

    assert_eq!(rendered.len(), 11);
    assert!(!rendered.contains(&pair.verifier[4..39]));
}
