//! The serialized form of one AEAD encryption.
//!
//! JSON layout (camelCase, binary fields as standard base64):
//!
//! ```text
//! {"ciphertext":"..","salt":"..","iv":"..","tag":"..","keyVersion":"v1"}
//! ```
//!
//! `salt` feeds PBKDF2, `iv` is the 16-byte AES-GCM nonce and `tag` the
//! detached 16-byte authentication tag.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::kdf::SALT_LEN;
use crate::errors::{FieldSealError, Result};

/// Length of the AES-GCM nonce in bytes.
pub const IV_LEN: usize = 16;

/// Length of the AES-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Everything needed to decrypt one payload, minus the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub ciphertext: Vec<u8>,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub iv: Vec<u8>,

    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub tag: Vec<u8>,

    /// Master-key version this envelope was sealed under.
    pub key_version: String,
}

impl EncryptedEnvelope {
    /// Check the fixed-size parameters.
    pub fn validate(&self) -> Result<()> {
        if self.salt.len() != SALT_LEN
            || self.iv.len() != IV_LEN
            || self.tag.len() != TAG_LEN
            || self.key_version.is_empty()
        {
            return Err(FieldSealError::Decryption("malformed envelope"));
        }
        Ok(())
    }

    /// Serialize to the transport string stored in record columns.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| FieldSealError::Serialization(format!("envelope: {e}")))
    }

    /// Parse a transport string.  Any parse failure is a decryption
    /// failure: the caller handed us something that is not an envelope.
    pub fn from_json(s: &str) -> Result<Self> {
        let envelope: Self =
            serde_json::from_str(s).map_err(|_| FieldSealError::Decryption("malformed envelope"))?;
        envelope.validate()?;
        Ok(envelope)
    }
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let encoded = BASE64.encode(data);
    serializer.serialize_str(&encoded)
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}
