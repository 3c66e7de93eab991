//! Password-based key derivation using PBKDF2-HMAC-SHA256.
//!
//! The same secret + salt + iteration count always produces the same
//! key.  The iteration count comes from `Settings` (default 100 000)
//! and is checked against a floor so a typo in the config cannot
//! silently weaken every derived key.

use hmac::Hmac;
use rand::RngCore;
use sha2::Sha256;

use crate::errors::{FieldSealError, Result};

/// Length of the derived key in bytes (256 bits, for AES-256).
pub const KEY_LEN: usize = 32;

/// Length of a KDF salt in bytes (256 bits).
pub const SALT_LEN: usize = 32;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Minimum accepted PBKDF2 iteration count.
pub const MIN_ITERATIONS: u32 = 1_000;

/// Maximum accepted PBKDF2 iteration count.
pub const MAX_ITERATIONS: u32 = 10_000_000;

/// Check an iteration count against the floor and the ceiling.
pub fn validate_iterations(iterations: u32) -> Result<()> {
    if iterations < MIN_ITERATIONS {
        return Err(FieldSealError::KeyDerivation(format!(
            "PBKDF2 iterations must be at least {MIN_ITERATIONS} (got {iterations})"
        )));
    }
    if iterations > MAX_ITERATIONS {
        return Err(FieldSealError::KeyDerivation(format!(
            "PBKDF2 iterations must be at most {MAX_ITERATIONS} (got {iterations})"
        )));
    }
    Ok(())
}

/// Derive `out.len()` bytes from `secret` and `salt`.
pub fn pbkdf2_into(secret: &[u8], salt: &[u8], iterations: u32, out: &mut [u8]) -> Result<()> {
    validate_iterations(iterations)?;
    pbkdf2::pbkdf2::<Hmac<Sha256>>(secret, salt, iterations, out)
        .map_err(|e| FieldSealError::KeyDerivation(format!("PBKDF2 failed: {e}")))
}

/// Derive a 32-byte key from `secret` and `salt`.
pub fn derive_key_bytes(secret: &[u8], salt: &[u8], iterations: u32) -> Result<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_into(secret, salt, iterations, &mut key)?;
    Ok(key)
}

/// Generate a cryptographically random 32-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    random_bytes()
}

/// Fill an `N`-byte array from the thread-local CSPRNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::rng().fill_bytes(&mut buf);
    buf
}
