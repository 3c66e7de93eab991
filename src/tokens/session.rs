//! Session token payload and validation result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TokenError;

/// The plaintext sealed inside a session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub user_id: String,
    pub session_data: Value,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    /// Expired from the instant `expires_at` is reached.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outcome reported to the authentication layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionValidation {
    pub valid: bool,
    pub session_data: Option<Value>,
    pub reason: Option<TokenError>,
}

impl From<Result<SessionClaims, TokenError>> for SessionValidation {
    fn from(result: Result<SessionClaims, TokenError>) -> Self {
        match result {
            Ok(claims) => Self {
                valid: true,
                session_data: Some(claims.session_data),
                reason: None,
            },
            Err(reason) => Self {
                valid: false,
                session_data: None,
                reason: Some(reason),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn claims_serialize_as_camel_case_millis() {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let claims = SessionClaims {
            user_id: "u-1".into(),
            session_data: serde_json::json!({"role": "admin"}),
            created_at: created,
            expires_at: created + Duration::hours(24),
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["userId"], "u-1");
        assert_eq!(json["createdAt"], created.timestamp_millis());
    }

    #[test]
    fn expiry_is_inclusive_of_the_boundary() {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let claims = SessionClaims {
            user_id: "u-1".into(),
            session_data: Value::Null,
            created_at: created,
            expires_at: created + Duration::hours(1),
        };
        assert!(!claims.is_expired(created + Duration::minutes(59)));
        assert!(claims.is_expired(created + Duration::hours(1)));
    }

    #[test]
    fn validation_carries_reason_text() {
        let v = SessionValidation::from(Err(TokenError::Expired));
        assert!(!v.valid);
        assert_eq!(v.reason.map(|r| r.to_string()).as_deref(), Some("Token expired"));
    }
}
