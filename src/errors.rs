use thiserror::Error;

/// All errors that can occur in FieldSeal.
///
/// No variant ever carries plaintext, IVs, salts or key bytes.
#[derive(Debug, Error)]
pub enum FieldSealError {
    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(&'static str),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    // --- Token errors ---
    #[error(transparent)]
    Token(#[from] TokenError),

    // --- Backup errors ---
    #[error("Checksum mismatch: backup may be tampered or corrupted")]
    ChecksumMismatch,

    #[error("Backup table mismatch: expected '{expected}', found '{found}'")]
    TableMismatch { expected: String, found: String },

    // --- Config errors ---
    #[error("Configuration error: {0}")]
    Configuration(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    Serialization(String),

    // --- Audit errors ---
    #[error("Audit error: {0}")]
    Audit(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

/// Reasons a session token is rejected.
///
/// The display strings are part of the public contract with the
/// authentication layer and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,

    #[error("Invalid user")]
    InvalidUser,

    #[error("Invalid token format")]
    InvalidFormat,
}

/// Convenience type alias for FieldSeal results.
pub type Result<T> = std::result::Result<T, FieldSealError>;
