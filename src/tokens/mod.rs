//! Session and CSRF tokens for the authentication layer.
//!
//! Session tokens are AEAD envelopes over a JSON `SessionClaims`,
//! bound to `"session:{user_id}"` and framed as URL-safe base64 so they
//! fit in a cookie.  Checking a token against the wrong user changes the
//! associated data, so decryption itself fails closed; expiry and the
//! embedded user id are re-checked after decryption anyway.
//!
//! CSRF tokens are unencrypted, time-windowed nonces (see `csrf`).

pub mod csrf;
pub mod session;

pub use csrf::CsrfPayload;
pub use session::{SessionClaims, SessionValidation};

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use crate::audit::{AuditEvent, AuditOperation, AuditSink};
use crate::clock::SharedClock;
use crate::crypto::{AeadCipher, EncryptedEnvelope};
use crate::errors::{FieldSealError, Result, TokenError};

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// Default CSRF validity window.
pub const DEFAULT_CSRF_MAX_AGE_SECS: i64 = 3600;

/// Associated data binding a session token to its user.
pub fn session_context(user_id: &str) -> String {
    format!("session:{user_id}")
}

/// Issues and validates session and CSRF tokens.
pub struct TokenService {
    cipher: AeadCipher,
    clock: SharedClock,
    session_ttl: Duration,
    csrf_max_age: Duration,
    /// Spent CSRF nonces → unix millis after which they can be forgotten.
    spent_nonces: Mutex<HashMap<String, i64>>,
    audit: Arc<dyn AuditSink>,
}

impl TokenService {
    pub fn new(cipher: AeadCipher, clock: SharedClock, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            cipher,
            clock,
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            csrf_max_age: Duration::seconds(DEFAULT_CSRF_MAX_AGE_SECS),
            spent_nonces: Mutex::new(HashMap::new()),
            audit,
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_csrf_max_age(mut self, max_age: Duration) -> Self {
        self.csrf_max_age = max_age;
        self
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    pub fn csrf_max_age(&self) -> Duration {
        self.csrf_max_age
    }

    fn now(&self) -> DateTime<Utc> {
        // Claims travel as unix millis; keep in-memory times comparable.
        self.clock.now().trunc_subsecs(3)
    }

    // ------------------------------------------------------------------
    // Session tokens
    // ------------------------------------------------------------------

    /// Seal `{user_id, session_data, created_at: now, expires_at: now + ttl}`.
    pub fn generate_session_token(&self, user_id: &str, session_data: Value) -> Result<String> {
        let now = self.now();
        let result = now
            .checked_add_signed(self.session_ttl)
            .ok_or_else(|| {
                FieldSealError::Configuration("session expiry is out of range".into())
            })
            .and_then(|expires_at| {
                self.seal_claims(&SessionClaims {
                    user_id: user_id.to_string(),
                    session_data,
                    created_at: now,
                    expires_at,
                })
            });

        let mut event = AuditEvent::new(AuditOperation::IssueSession)
            .at(now)
            .user_id(user_id)
            .outcome(&result);
        if result.is_ok() {
            event = event.key_version(self.cipher.keys().active_version());
        }
        self.audit.record(event);

        result
    }

    fn seal_claims(&self, claims: &SessionClaims) -> Result<String> {
        let plaintext = serde_json::to_vec(claims)
            .map_err(|e| FieldSealError::Serialization(format!("session claims: {e}")))?;
        let envelope = self
            .cipher
            .encrypt(&plaintext, Some(session_context(&claims.user_id).as_bytes()))?;
        Ok(URL_SAFE_NO_PAD.encode(envelope.to_json()?))
    }

    /// Decrypt and check a session token for `user_id`.
    pub fn verify_session_token(
        &self,
        token: &str,
        user_id: &str,
    ) -> std::result::Result<SessionClaims, TokenError> {
        let now = self.now();
        let result = self.open_claims(token, user_id).and_then(|claims| {
            if claims.is_expired(now) {
                Err(TokenError::Expired)
            } else if claims.user_id != user_id {
                Err(TokenError::InvalidUser)
            } else {
                Ok(claims)
            }
        });

        self.audit.record(
            AuditEvent::new(AuditOperation::ValidateSession)
                .at(now)
                .user_id(user_id)
                .outcome(&result),
        );

        result
    }

    /// `verify_session_token` reduced to the `{valid, sessionData, reason}`
    /// shape the authentication layer consumes.
    pub fn validate_session_token(&self, token: &str, user_id: &str) -> SessionValidation {
        self.verify_session_token(token, user_id).into()
    }

    fn open_claims(&self, token: &str, user_id: &str) -> std::result::Result<SessionClaims, TokenError> {
        let framed = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| TokenError::InvalidFormat)?;
        let json = std::str::from_utf8(&framed).map_err(|_| TokenError::InvalidFormat)?;
        let envelope = EncryptedEnvelope::from_json(json).map_err(|_| TokenError::InvalidFormat)?;
        let plaintext = self
            .cipher
            .decrypt(&envelope, Some(session_context(user_id).as_bytes()))
            .map_err(|_| TokenError::InvalidFormat)?;
        serde_json::from_slice(&plaintext).map_err(|_| TokenError::InvalidFormat)
    }

    // ------------------------------------------------------------------
    // CSRF tokens
    // ------------------------------------------------------------------

    /// A fresh `{nonce, timestamp}` token.
    pub fn generate_csrf_token(&self) -> String {
        let now = self.now();
        let token = CsrfPayload::fresh(now).encode();
        self.audit
            .record(AuditEvent::new(AuditOperation::IssueCsrf).at(now));
        token
    }

    /// Check a CSRF token against the configured window.
    pub fn validate_csrf_token(&self, token: &str) -> bool {
        self.validate_csrf_token_with_max_age(token, self.csrf_max_age)
    }

    /// Check a CSRF token: valid when `0 <= now - timestamp <= max_age`.
    /// Malformed input is simply invalid.
    pub fn validate_csrf_token_with_max_age(&self, token: &str, max_age: Duration) -> bool {
        let now = self.now();
        let valid = CsrfPayload::decode(token).is_some_and(|p| p.is_fresh(now, max_age));
        self.record_csrf_check(now, valid, None);
        valid
    }

    /// Validate and spend a CSRF token.  A second presentation of the
    /// same nonce is rejected for as long as it would otherwise be valid.
    pub fn consume_csrf_token(&self, token: &str) -> bool {
        let now = self.now();
        let max_age = self.csrf_max_age;

        let Some(payload) = CsrfPayload::decode(token).filter(|p| p.is_fresh(now, max_age)) else {
            self.record_csrf_check(now, false, None);
            return false;
        };

        let now_ms = now.timestamp_millis();
        let fresh_use = {
            let mut spent = self.spent_nonces.lock();
            spent.retain(|_, forget_after| *forget_after >= now_ms);
            if spent.contains_key(&payload.nonce) {
                false
            } else {
                spent.insert(payload.nonce.clone(), payload.expires_at(max_age));
                true
            }
        };

        self.record_csrf_check(now, fresh_use, (!fresh_use).then_some("token already used"));
        fresh_use
    }

    fn record_csrf_check(&self, now: DateTime<Utc>, valid: bool, reason: Option<&str>) {
        let mut event = AuditEvent::new(AuditOperation::ValidateCsrf).at(now);
        if !valid {
            event = event.failed(reason.unwrap_or("invalid or expired CSRF token"));
        }
        self.audit.record(event);
    }
}
