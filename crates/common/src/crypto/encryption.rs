//! AES-256-GCM authenticated encryption with Argon2 key derivation.
//!
//! The 16-byte GCM tag is split off the ciphertext so that callers can store
//! it as a separate field. [`EncryptionService::open`] verifies the tag before
//! any plaintext is returned; a mismatch surfaces as
//! `CommonError::Encryption` and never as partial output.
//!
//! ```rust
//! use tokenlink_common::crypto::EncryptionService;
//!
//! let salt = EncryptionService::generate_salt()?;
//! let service = EncryptionService::derive(b"installation secret", &salt)?;
//! let sealed = service.seal(b"refresh token", b"v2")?;
//! assert_eq!(service.open(&sealed, b"v2")?, b"refresh token");
//! # Ok::<(), tokenlink_common::error::CommonError>(())
//! ```

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::Argon2;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{CommonError, CommonResult};

/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;
/// GCM nonce length in bytes
pub const NONCE_LEN: usize = 12;
/// GCM authentication tag length in bytes
pub const TAG_LEN: usize = 16;
/// Argon2 salt length generated for new installations
pub const SALT_LEN: usize = 16;

/// Output of [`EncryptionService::seal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    /// Random 96-bit nonce
    pub nonce: Vec<u8>,
    /// Ciphertext without the tag
    pub ciphertext: Vec<u8>,
    /// GCM authentication tag
    pub tag: Vec<u8>,
}

/// AES-256-GCM cipher holding a derived key.
///
/// The raw key only exists transiently during construction and is zeroized
/// afterwards.
#[derive(Clone)]
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionService").field("key", &"[REDACTED]").finish()
    }
}

impl EncryptionService {
    /// Create a service from a raw 32-byte key.
    #[must_use]
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        Self { cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)) }
    }

    /// Derive the key from `secret` and `salt` with Argon2id (default
    /// parameters).
    ///
    /// # Errors
    /// Returns `CommonError::Encryption` when the salt is too short or the
    /// derivation fails.
    pub fn derive(secret: &[u8], salt: &[u8]) -> CommonResult<Self> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        Argon2::default()
            .hash_password_into(secret, salt, &mut key[..])
            .map_err(|e| CommonError::encryption(format!("key derivation failed: {e}")))?;
        Ok(Self::new(&key))
    }

    /// Generate a random salt for [`derive`](Self::derive).
    ///
    /// # Errors
    /// Returns `CommonError::Entropy` if the OS random source fails.
    pub fn generate_salt() -> CommonResult<Vec<u8>> {
        random_bytes(SALT_LEN)
    }

    /// Encrypt `plaintext`, binding `aad` into the tag.
    ///
    /// # Errors
    /// Returns `CommonError::Entropy` if no nonce can be drawn, or
    /// `CommonError::Encryption` if the cipher fails.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> CommonResult<SealedPayload> {
        let nonce = random_bytes(NONCE_LEN)?;
        let mut combined = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
            .map_err(|_| CommonError::encryption("encryption failed"))?;

        let split_at = combined
            .len()
            .checked_sub(TAG_LEN)
            .ok_or_else(|| CommonError::internal("cipher output shorter than tag"))?;
        let tag = combined.split_off(split_at);
        Ok(SealedPayload { nonce, ciphertext: combined, tag })
    }

    /// Verify and decrypt a sealed payload.
    ///
    /// # Errors
    /// Returns `CommonError::Encryption` when the nonce or tag has the wrong
    /// length or authentication fails.
    pub fn open(&self, sealed: &SealedPayload, aad: &[u8]) -> CommonResult<Vec<u8>> {
        if sealed.nonce.len() != NONCE_LEN {
            return Err(CommonError::encryption("invalid nonce length"));
        }
        if sealed.tag.len() != TAG_LEN {
            return Err(CommonError::encryption("invalid tag length"));
        }

        let mut combined = Vec::with_capacity(sealed.ciphertext.len() + TAG_LEN);
        combined.extend_from_slice(&sealed.ciphertext);
        combined.extend_from_slice(&sealed.tag);

        self.cipher
            .decrypt(Nonce::from_slice(&sealed.nonce), Payload { msg: &combined, aad })
            .map_err(|_| CommonError::encryption("authentication tag mismatch"))
    }
}

fn random_bytes(len: usize) -> CommonResult<Vec<u8>> {
    let mut bytes = vec![0u8; len];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| CommonError::entropy(e.to_string()))?;
    Ok(bytes)
}
