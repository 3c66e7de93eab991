//! Loading the master secret at startup.
//!
//! A missing or unusable secret is a `Configuration` error; callers
//! must treat it as fatal and refuse to start.

use zeroize::Zeroizing;

use crate::crypto::keys::MasterKey;
use crate::errors::{FieldSealError, Result};

/// Read the master secret from the environment variable `var`.
pub fn master_key_from_env(var: &str) -> Result<MasterKey> {
    let value = Zeroizing::new(std::env::var(var).map_err(|_| {
        FieldSealError::Configuration(format!("master key not set (export {var})"))
    })?);
    master_key_from_str(&value)
}

/// Build a master key from a secret string.  Surrounding whitespace is
/// ignored; an empty secret is rejected.
pub fn master_key_from_str(secret: &str) -> Result<MasterKey> {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return Err(FieldSealError::Configuration("master key is empty".into()));
    }
    MasterKey::new(trimmed.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_is_a_configuration_error() {
        let err = master_key_from_env("FIELDSEAL_TEST_SURELY_UNSET_VAR").unwrap_err();
        assert!(matches!(err, FieldSealError::Configuration(_)));
        assert!(err.to_string().contains("FIELDSEAL_TEST_SURELY_UNSET_VAR"));
    }

    #[test]
    fn blank_and_short_secrets_are_rejected() {
        assert!(master_key_from_str("   ").is_err());
        assert!(master_key_from_str("too-short").is_err());
    }

    #[test]
    fn whitespace_is_trimmed() {
        let a = master_key_from_str("  0123456789abcdef0123456789abcdef\n").unwrap();
        let b = master_key_from_str("0123456789abcdef0123456789abcdef").unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
