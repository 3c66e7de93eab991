//! CSRF token framing.
//!
//! A CSRF token is `base64(JSON {"nonce": hex(32 random bytes),
//! "timestamp": unix millis})`.  It is not encrypted or signed:
//! integrity rests on nonce entropy and the validity window.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::kdf;

/// Random bytes in a CSRF nonce.
pub const NONCE_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfPayload {
    pub nonce: String,
    pub timestamp: i64,
}

impl CsrfPayload {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            nonce: hex::encode(kdf::random_bytes::<NONCE_LEN>()),
            timestamp: now.timestamp_millis(),
        }
    }

    pub fn encode(&self) -> String {
        // Serializing two plain fields cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        BASE64.encode(json)
    }

    /// Parse a token.  `None` for anything malformed, including a nonce
    /// that is not 32 hex-encoded bytes.
    pub fn decode(token: &str) -> Option<Self> {
        let bytes = BASE64.decode(token.trim()).ok()?;
        let payload: Self = serde_json::from_slice(&bytes).ok()?;
        let nonce = hex::decode(&payload.nonce).ok()?;
        (nonce.len() == NONCE_LEN).then_some(payload)
    }

    /// Inside the window when `0 <= now - timestamp <= max_age`.  A
    /// timestamp so far off that the age overflows is never fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let max_ms = max_age.num_milliseconds();
        now.timestamp_millis()
            .checked_sub(self.timestamp)
            .is_some_and(|age| age >= 0 && age <= max_ms)
    }

    /// The instant after which this token can never validate again.
    pub fn expires_at(&self, max_age: Duration) -> i64 {
        self.timestamp.saturating_add(max_age.num_milliseconds())
    }
}
