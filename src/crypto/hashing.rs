//! Password hashing and secure identifiers.
//!
//! Independent of the AEAD path: passwords are hashed with
//! PBKDF2-HMAC-SHA256 under their own random salt, and the algorithm
//! name and iteration count are stored next to the hash so a stored
//! credential keeps verifying after the global default changes.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use super::kdf::{self, KEY_LEN, SALT_LEN};
use crate::errors::Result;

/// Algorithm label written next to every hash.
pub const PASSWORD_ALGORITHM: &str = "pbkdf2-sha256";

/// Random bytes in a secure id (hex encoded to twice this length).
const SECURE_ID_BYTES: usize = 16;

/// A stored password credential.  `hash` and `salt` are hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    pub hash: String,
    pub salt: String,
    pub algorithm: String,
    pub iterations: u32,
}

/// Hashes and verifies passwords.
#[derive(Debug, Clone, Copy)]
pub struct HashingService {
    iterations: u32,
}

impl Default for HashingService {
    fn default() -> Self {
        Self {
            iterations: kdf::DEFAULT_ITERATIONS,
        }
    }
}

impl HashingService {
    /// Build a service that hashes new passwords with `iterations` rounds.
    pub fn new(iterations: u32) -> Result<Self> {
        kdf::validate_iterations(iterations)?;
        Ok(Self { iterations })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Hash `password` under a fresh random salt.
    pub fn hash_password(&self, password: &str) -> Result<PasswordHash> {
        let salt = kdf::random_bytes::<SALT_LEN>();
        let mut hash = [0u8; KEY_LEN];
        kdf::pbkdf2_into(password.as_bytes(), &salt, self.iterations, &mut hash)?;

        Ok(PasswordHash {
            hash: hex::encode(hash),
            salt: hex::encode(salt),
            algorithm: PASSWORD_ALGORITHM.to_string(),
            iterations: self.iterations,
        })
    }

    /// Recompute the hash with the stored salt and iteration count and
    /// compare in constant time.
    ///
    /// Returns `false` for a wrong password and for any malformed input:
    /// bad hex, a hash that is not 32 bytes, or an iteration count
    /// outside the accepted range.
    pub fn verify_password(
        &self,
        password: &str,
        stored_hash: &str,
        salt: &str,
        iterations: u32,
    ) -> bool {
        let (Ok(expected), Ok(salt)) = (hex::decode(stored_hash), hex::decode(salt)) else {
            return false;
        };
        if expected.len() != KEY_LEN {
            return false;
        }

        let mut actual = [0u8; KEY_LEN];
        if kdf::pbkdf2_into(password.as_bytes(), &salt, iterations, &mut actual).is_err() {
            return false;
        }

        actual.as_slice().ct_eq(expected.as_slice()).into()
    }

    /// Verify against a stored `PasswordHash`, rejecting unknown algorithms.
    pub fn verify(&self, password: &str, stored: &PasswordHash) -> bool {
        stored.algorithm == PASSWORD_ALGORITHM
            && self.verify_password(password, &stored.hash, &stored.salt, stored.iterations)
    }
}

/// A cryptographically random identifier, optionally prefixed:
/// `bkp_3f9a...` or `3f9a...`.
pub fn generate_secure_id(prefix: Option<&str>) -> String {
    let id = hex::encode(kdf::random_bytes::<SECURE_ID_BYTES>());
    match prefix {
        Some(p) if !p.is_empty() => format!("{p}_{id}"),
        _ => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> HashingService {
        HashingService::new(kdf::MIN_ITERATIONS).unwrap()
    }

    #[test]
    fn hash_records_parameters() {
        let h = service().hash_password("hunter22").unwrap();
        assert_eq!(h.algorithm, "pbkdf2-sha256");
        assert_eq!(h.iterations, kdf::MIN_ITERATIONS);
        assert_eq!(h.hash.len(), KEY_LEN * 2);
        assert_eq!(h.salt.len(), SALT_LEN * 2);
    }

    #[test]
    fn same_password_gets_fresh_salt() {
        let s = service();
        let a = s.hash_password("same").unwrap();
        let b = s.hash_password("same").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn stored_iterations_win_over_service_default() {
        let old = HashingService::new(2_000).unwrap();
        let stored = old.hash_password("pw").unwrap();

        let current = service();
        assert!(current.verify("pw", &stored));
    }

    #[test]
    fn malformed_inputs_return_false() {
        let s = service();
        let h = s.hash_password("pw").unwrap();
        assert!(!s.verify_password("pw", "zz", &h.salt, h.iterations));
        assert!(!s.verify_password("pw", &h.hash, "not-hex", h.iterations));
        assert!(!s.verify_password("pw", "", &h.salt, h.iterations));
        assert!(!s.verify_password("pw", &h.hash, &h.salt, 1));
    }

    #[test]
    fn corrupted_records_are_rejected_before_hashing() {
        let s = service();
        let h = s.hash_password("pw").unwrap();

        // A hash of the wrong length never sizes the PBKDF2 output.
        let long = "00".repeat(1 << 20);
        assert!(!s.verify_password("pw", &long, &h.salt, h.iterations));
        assert!(!s.verify_password("pw", &h.hash[..62], &h.salt, h.iterations));

        // Nor does an absurd iteration count run.
        assert!(!s.verify_password("pw", &h.hash, &h.salt, u32::MAX));
        assert!(HashingService::new(kdf::MAX_ITERATIONS + 1).is_err());
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let s = service();
        let mut h = s.hash_password("pw").unwrap();
        h.algorithm = "md5".into();
        assert!(!s.verify("pw", &h));
    }

    #[test]
    fn secure_ids_are_random_and_prefixed() {
        let a = generate_secure_id(Some("bkp"));
        let b = generate_secure_id(Some("bkp"));
        assert!(a.starts_with("bkp_"));
        assert_eq!(a.len(), 4 + SECURE_ID_BYTES * 2);
        assert_ne!(a, b);
        assert_eq!(generate_secure_id(None).len(), SECURE_ID_BYTES * 2);
    }
}
