//! Cryptographic primitives for FieldSeal.
//!
//! This module provides:
//! - AES-256-GCM envelope encryption (`cipher`, `envelope`)
//! - PBKDF2-HMAC-SHA256 key derivation (`kdf`)
//! - Master-key ring, derived-key cache and rotation (`keys`)
//! - Password hashing and secure ids (`hashing`)

pub mod cipher;
pub mod envelope;
pub mod hashing;
pub mod kdf;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{AeadCipher, KeyManager, ...};
pub use cipher::AeadCipher;
pub use envelope::{EncryptedEnvelope, IV_LEN, TAG_LEN};
pub use hashing::{generate_secure_id, HashingService, PasswordHash};
pub use kdf::{generate_salt, KEY_LEN, SALT_LEN};
pub use keys::{DerivedKey, KeyManager, KeyOptions, KeyRotation, MasterKey};
