//! AES-256-GCM authenticated encryption into `EncryptedEnvelope`s.
//!
//! Each call to `encrypt` draws a fresh 32-byte salt and 16-byte IV,
//! derives a key from the active master key + salt, and seals the
//! plaintext with the optional associated data bound in.  `decrypt`
//! re-derives the key for the envelope's key version and verifies the
//! tag before any plaintext is released.

use std::sync::Arc;

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};

use super::envelope::{EncryptedEnvelope, IV_LEN};
use super::kdf;
use super::keys::KeyManager;
use crate::errors::{FieldSealError, Result};

/// AES-256-GCM with a 16-byte nonce and 16-byte tag.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Authenticated encryption bound to a `KeyManager`.
#[derive(Debug, Clone)]
pub struct AeadCipher {
    keys: Arc<KeyManager>,
}

impl AeadCipher {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Encrypt `plaintext`, binding `associated_data` if supplied.
    ///
    /// `None` and `Some(b"")` bind the same (empty) context.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        associated_data: Option<&[u8]>,
    ) -> Result<EncryptedEnvelope> {
        let (key_version, master) = self.keys.active_key()?;

        let salt = kdf::generate_salt();
        let iv = kdf::random_bytes::<IV_LEN>();

        let key = self
            .keys
            .derive_key(&master, &salt)
            .map_err(|e| FieldSealError::Encryption(e.to_string()))?;

        let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
            .map_err(|e| FieldSealError::Encryption(format!("invalid key length: {e}")))?;

        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(
                Nonce::<U16>::from_slice(&iv),
                associated_data.unwrap_or_default(),
                &mut buffer,
            )
            .map_err(|e| FieldSealError::Encryption(format!("cipher error: {e}")))?;

        Ok(EncryptedEnvelope {
            ciphertext: buffer,
            salt: salt.to_vec(),
            iv: iv.to_vec(),
            tag: tag.to_vec(),
            key_version,
        })
    }

    /// Decrypt an envelope.  `associated_data` must equal what was bound
    /// at encryption time.  No plaintext is returned unless the tag
    /// verifies.
    pub fn decrypt(
        &self,
        envelope: &EncryptedEnvelope,
        associated_data: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        envelope.validate()?;

        let master = self
            .keys
            .master_for(&envelope.key_version)
            .ok_or(FieldSealError::Decryption("unknown key version"))?;

        let key = self
            .keys
            .derive_key(&master, &envelope.salt)
            .map_err(|_| FieldSealError::Decryption("key derivation failed"))?;

        let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
            .map_err(|_| FieldSealError::Decryption("key derivation failed"))?;

        let mut buffer = envelope.ciphertext.clone();
        cipher
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(&envelope.iv),
                associated_data.unwrap_or_default(),
                &mut buffer,
                Tag::<U16>::from_slice(&envelope.tag),
            )
            .map_err(|_| FieldSealError::Decryption("authentication failed"))?;

        Ok(buffer)
    }

    /// Convenience: encrypt a UTF-8 string with a string context.
    pub fn encrypt_str(&self, plaintext: &str, context: &str) -> Result<EncryptedEnvelope> {
        self.encrypt(plaintext.as_bytes(), Some(context.as_bytes()))
    }

    /// Convenience: decrypt to a UTF-8 string with a string context.
    pub fn decrypt_str(&self, envelope: &EncryptedEnvelope, context: &str) -> Result<String> {
        let bytes = self.decrypt(envelope, Some(context.as_bytes()))?;
        String::from_utf8(bytes).map_err(|_| FieldSealError::Decryption("plaintext is not UTF-8"))
    }
}
