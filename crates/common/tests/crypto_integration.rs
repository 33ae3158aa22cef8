//! Integration tests for the crypto module

#![cfg(feature = "runtime")]

use tokenlink_common::crypto::EncryptionService;
use tokenlink_common::error::{CommonError, ErrorClassification};

/// Validates that a payload sealed under one installation secret cannot be
/// opened under another.
///
/// # Test Steps
/// 1. Derive two services from different secrets and the same salt
/// 2. Seal with the first, open with the second
/// 3. Confirm the failure is a critical encryption error
#[test]
fn test_wrong_secret_is_a_critical_failure() {
    let salt = EncryptionService::generate_salt().expect("entropy available");
    let ours = EncryptionService::derive(b"installation-a", &salt).expect("derive");
    let theirs = EncryptionService::derive(b"installation-b", &salt).expect("derive");

    let sealed = ours.seal(br#"{"access_token":"x"}"#, b"tokenlink-store:v2").expect("seal");
    let err = theirs.open(&sealed, b"tokenlink-store:v2").expect_err("different key");

    assert!(matches!(err, CommonError::Encryption { .. }));
    assert!(err.is_critical());
    assert!(!err.is_retryable());
}
