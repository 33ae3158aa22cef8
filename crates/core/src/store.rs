//! Encrypted token store
//!
//! A [`TokenSet`] is serialized to JSON and sealed with AES-256-GCM under a
//! key derived (Argon2) from the installation secret and a persisted salt.
//! Any integrity or format failure on load is `CorruptStore`, never an empty
//! store.

use std::sync::Arc;

use parking_lot::Mutex;
use tokenlink_common::crypto::encryption::{NONCE_LEN, SALT_LEN, TAG_LEN};
use tokenlink_common::crypto::{EncryptionService, SealedPayload};
use tokenlink_domain::constants::STORE_FORMAT_VERSION;
use tokenlink_domain::{EncryptedBlob, TokenSet};
use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

use crate::error::{OAuthError, OAuthResult};
use crate::ports::BlobStorage;

/// Additional data bound into every tag
const STORE_AAD: &[u8] = b"tokenlink-store:v2";

/// Encrypts, persists and decrypts the installation's token set.
pub struct TokenStore {
    secret: Zeroizing<Vec<u8>>,
    storage: Arc<dyn BlobStorage>,
    /// Salt and derived cipher of the last successful derivation
    cipher: Mutex<Option<(Vec<u8>, EncryptionService)>>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").field("secret", &"[REDACTED]").finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(installation_secret: impl AsRef<[u8]>, storage: Arc<dyn BlobStorage>) -> Self {
        Self {
            secret: Zeroizing::new(installation_secret.as_ref().to_vec()),
            storage,
            cipher: Mutex::new(None),
        }
    }

    /// Encrypt `tokens` into a blob.
    ///
    /// # Errors
    /// Returns `OAuthError::CryptoFailure` if no salt or nonce can be drawn
    /// or key derivation fails.
    pub fn save(&self, tokens: &TokenSet) -> OAuthResult<EncryptedBlob> {
        let (salt, cipher) = self.current_cipher()?;
        let plaintext = Zeroizing::new(
            serde_json::to_vec(tokens).map_err(|e| OAuthError::Internal(e.to_string()))?,
        );
        let sealed = cipher.seal(&plaintext, STORE_AAD)?;
        Ok(EncryptedBlob {
            format_version: STORE_FORMAT_VERSION,
            salt,
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
            mac: sealed.tag,
        })
    }

    /// Decrypt and verify a blob.
    ///
    /// # Errors
    /// Returns `OAuthError::CorruptStore` for an unknown version, malformed
    /// fields, a tag mismatch or plaintext that is not a valid token set.
    pub fn load(&self, blob: &EncryptedBlob) -> OAuthResult<TokenSet> {
        if blob.format_version != STORE_FORMAT_VERSION {
            return Err(OAuthError::CorruptStore(format!(
                "unsupported format version {}",
                blob.format_version
            )));
        }
        if blob.salt.len() < SALT_LEN || blob.nonce.len() != NONCE_LEN || blob.mac.len() != TAG_LEN
        {
            return Err(OAuthError::CorruptStore("malformed blob fields".to_string()));
        }

        let cipher = self.cipher_for_salt(&blob.salt)?;
        let sealed = SealedPayload {
            nonce: blob.nonce.clone(),
            ciphertext: blob.ciphertext.clone(),
            tag: blob.mac.clone(),
        };
        let plaintext = Zeroizing::new(
            cipher
                .open(&sealed, STORE_AAD)
                .map_err(|_| OAuthError::CorruptStore("integrity check failed".to_string()))?,
        );
        let tokens: TokenSet = serde_json::from_slice(&plaintext)
            .map_err(|_| OAuthError::CorruptStore("malformed token set".to_string()))?;
        tokens.validate().map_err(|e| OAuthError::CorruptStore(e.to_string()))?;

        *self.cipher.lock() = Some((blob.salt.clone(), cipher));
        Ok(tokens)
    }

    /// Encrypt and write `tokens` to storage.
    ///
    /// # Errors
    /// Returns the error of [`save`](Self::save) or of the storage write.
    #[instrument(skip_all)]
    pub async fn persist(&self, tokens: &TokenSet) -> OAuthResult<()> {
        let blob = self.save(tokens)?;
        let bytes = blob.to_bytes().map_err(|e| OAuthError::Internal(e.to_string()))?;
        self.storage.write(&bytes).await?;
        debug!(bytes = bytes.len(), "Token set persisted");
        Ok(())
    }

    /// Read and decrypt the persisted token set.
    ///
    /// Returns `Ok(None)` only when no blob exists.
    ///
    /// # Errors
    /// Returns `OAuthError::CorruptStore` for an unreadable blob, or the
    /// storage error.
    #[instrument(skip_all)]
    pub async fn load_persisted(&self) -> OAuthResult<Option<TokenSet>> {
        let Some(bytes) = self.storage.read().await? else {
            debug!("No persisted token set");
            return Ok(None);
        };
        let blob = EncryptedBlob::from_bytes(&bytes)
            .map_err(|_| OAuthError::CorruptStore("blob is not valid JSON".to_string()))?;
        self.load(&blob).map(Some)
    }

    /// Delete the persisted blob and forget the derived key.
    ///
    /// # Errors
    /// Returns the storage error.
    #[instrument(skip_all)]
    pub async fn destroy(&self) -> OAuthResult<()> {
        self.storage.delete().await?;
        *self.cipher.lock() = None;
        info!("Persisted token set destroyed");
        Ok(())
    }

    fn current_cipher(&self) -> OAuthResult<(Vec<u8>, EncryptionService)> {
        if let Some((salt, cipher)) = self.cipher.lock().as_ref() {
            return Ok((salt.clone(), cipher.clone()));
        }
        let salt = EncryptionService::generate_salt()?;
        let cipher = EncryptionService::derive(&self.secret, &salt)?;
        *self.cipher.lock() = Some((salt.clone(), cipher.clone()));
        Ok((salt, cipher))
    }

    fn cipher_for_salt(&self, salt: &[u8]) -> OAuthResult<EncryptionService> {
        if let Some((cached_salt, cipher)) = self.cipher.lock().as_ref() {
            if cached_salt == salt {
                return Ok(cipher.clone());
            }
        }
        EncryptionService::derive(&self.secret, salt)
            .map_err(|e| OAuthError::CryptoFailure(e.to_string()))
    }
}
