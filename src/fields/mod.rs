//! Field-level encryption for records.
//!
//! Each field is sealed with associated data `"{field}:{record_id}"`, so
//! a ciphertext copied into another column or another row fails to
//! decrypt even under the right master key.
//!
//! Records are JSON objects.  An encrypted field holds the envelope
//! JSON string and gains two sibling columns:
//!
//! ```text
//! email            = "{\"ciphertext\":...}"
//! email_encrypted  = true
//! email_version    = "v1"
//! ```

pub mod policy;

pub use policy::{EncryptWhen, SensitiveFields, TablePolicy};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::audit::{AuditEvent, AuditOperation, AuditSink};
use crate::crypto::{AeadCipher, EncryptedEnvelope};
use crate::errors::{FieldSealError, Result};

/// Format version written to `{field}_version`.
pub const FIELD_FORMAT_VERSION: &str = "v1";

/// How `decrypt_record` reacts to a field that fails to decrypt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptPolicy {
    /// Null the field, audit the failure, keep going.
    #[default]
    Lenient,
    /// Return the first failure.
    Strict,
}

/// Encrypts and decrypts record fields.
pub struct FieldCodec {
    cipher: AeadCipher,
    tables: SensitiveFields,
    policy: DecryptPolicy,
    audit: Arc<dyn AuditSink>,
}

impl FieldCodec {
    pub fn new(cipher: AeadCipher, tables: SensitiveFields, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            cipher,
            tables,
            policy: DecryptPolicy::default(),
            audit,
        }
    }

    pub fn with_policy(mut self, policy: DecryptPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn tables(&self) -> &SensitiveFields {
        &self.tables
    }

    /// Encrypt one value for `(field_name, record_id)`.
    pub fn encrypt_field(&self, value: &Value, field_name: &str, record_id: &str) -> Result<String> {
        self.seal(value, field_name, record_id, None)
    }

    /// Decrypt a value produced by `encrypt_field` for the same
    /// `(field_name, record_id)`.
    pub fn decrypt_field(&self, encoded: &str, field_name: &str, record_id: &str) -> Result<Value> {
        self.open(encoded, field_name, record_id, None)
    }

    /// Encrypt the configured sensitive fields of `record`.
    ///
    /// Tables without a policy, and records the policy's condition
    /// excludes, come back unchanged.  Null or missing fields are left
    /// alone, as are fields already marked encrypted.
    pub fn encrypt_record(&self, record: &Map<String, Value>, table: &str) -> Result<Map<String, Value>> {
        let mut out = record.clone();
        let Some(policy) = self.tables.policy_for(table) else {
            return Ok(out);
        };
        if !policy.condition.applies(record) {
            return Ok(out);
        }

        let record_id = record_id(record, &policy.id_field)
            .ok_or_else(|| FieldSealError::Encryption(format!("record has no '{}'", policy.id_field)))?;

        for field in &policy.fields {
            let value = match record.get(field) {
                None | Some(Value::Null) => continue,
                Some(v) => v,
            };
            if is_marked_encrypted(record, field) {
                continue;
            }

            let sealed = self.seal(value, field, &record_id, Some(table))?;
            out.insert(field.clone(), Value::String(sealed));
            out.insert(encrypted_flag(field), Value::Bool(true));
            out.insert(version_key(field), Value::String(FIELD_FORMAT_VERSION.to_string()));
        }

        Ok(out)
    }

    /// Decrypt every field of `record` marked `{field}_encrypted = true`.
    ///
    /// Under `DecryptPolicy::Lenient` a field that fails to decrypt is
    /// set to `null` and audited; under `Strict` the error is returned.
    /// A record with no id fails every marked field the same way.
    /// Decrypted fields lose their `_encrypted`/`_version` markers.
    pub fn decrypt_record(&self, record: &Map<String, Value>, table: &str) -> Result<Map<String, Value>> {
        let mut out = record.clone();
        let Some(policy) = self.tables.policy_for(table) else {
            return Ok(out);
        };

        let marked: Vec<&String> = policy
            .fields
            .iter()
            .filter(|f| is_marked_encrypted(record, f))
            .collect();
        if marked.is_empty() {
            return Ok(out);
        }

        let record_id = record_id(record, &policy.id_field);

        for field in marked {
            let result = match (&record_id, record.get(field.as_str())) {
                (Some(id), Some(Value::String(encoded))) => self.open(encoded, field, id, Some(table)),
                (id, _) => {
                    let err = if id.is_none() {
                        FieldSealError::Decryption("record has no id")
                    } else {
                        FieldSealError::Decryption("malformed envelope")
                    };
                    self.record_decrypt_failure(field, id.as_deref(), table, &err);
                    Err(err)
                }
            };

            match result {
                Ok(value) => {
                    out.insert(field.clone(), value);
                }
                Err(e) if self.policy == DecryptPolicy::Lenient => {
                    tracing::warn!(
                        table,
                        field = field.as_str(),
                        record_id = record_id.as_deref().unwrap_or("-"),
                        "field failed to decrypt, returning null: {e}"
                    );
                    out.insert(field.clone(), Value::Null);
                }
                Err(e) => return Err(e),
            }
            out.remove(&encrypted_flag(field));
            out.remove(&version_key(field));
        }

        Ok(out)
    }

    fn record_decrypt_failure(
        &self,
        field: &str,
        record_id: Option<&str>,
        table: &str,
        err: &FieldSealError,
    ) {
        let mut event = AuditEvent::new(AuditOperation::DecryptField)
            .table(table)
            .field(field)
            .failed(err);
        if let Some(id) = record_id {
            event = event.record_id(id);
        }
        self.audit.record(event);
    }

    fn seal(&self, value: &Value, field: &str, record_id: &str, table: Option<&str>) -> Result<String> {
        let result = serde_json::to_vec(value)
            .map_err(|e| FieldSealError::Serialization(format!("field value: {e}")))
            .and_then(|plaintext| {
                self.cipher
                    .encrypt(&plaintext, Some(field_context(field, record_id).as_bytes()))
            })
            .and_then(|envelope| Ok((envelope.to_json()?, envelope.key_version)));

        let mut event = AuditEvent::new(AuditOperation::EncryptField)
            .field(field)
            .record_id(record_id)
            .outcome(&result);
        if let Some(table) = table {
            event = event.table(table);
        }
        if let Ok((_, version)) = &result {
            event = event.key_version(version.as_str());
        }
        self.audit.record(event);

        result.map(|(encoded, _)| encoded)
    }

    fn open(&self, encoded: &str, field: &str, record_id: &str, table: Option<&str>) -> Result<Value> {
        let envelope = EncryptedEnvelope::from_json(encoded);
        let key_version = envelope.as_ref().ok().map(|e| e.key_version.clone());

        let result = envelope.and_then(|envelope| {
            let plaintext = self
                .cipher
                .decrypt(&envelope, Some(field_context(field, record_id).as_bytes()))?;
            serde_json::from_slice::<Value>(&plaintext)
                .map_err(|_| FieldSealError::Decryption("plaintext is not a JSON value"))
        });

        let mut event = AuditEvent::new(AuditOperation::DecryptField)
            .field(field)
            .record_id(record_id)
            .outcome(&result);
        if let Some(table) = table {
            event = event.table(table);
        }
        if let Some(version) = key_version {
            event = event.key_version(version);
        }
        self.audit.record(event);

        result
    }
}

/// Associated data binding a ciphertext to one field of one record.
pub fn field_context(field: &str, record_id: &str) -> String {
    format!("{field}:{record_id}")
}

fn encrypted_flag(field: &str) -> String {
    format!("{field}_encrypted")
}

fn version_key(field: &str) -> String {
    format!("{field}_version")
}

fn is_marked_encrypted(record: &Map<String, Value>, field: &str) -> bool {
    matches!(record.get(&encrypted_flag(field)), Some(Value::Bool(true)))
}

fn record_id(record: &Map<String, Value>, id_field: &str) -> Option<String> {
    match record.get(id_field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_joins_field_and_record() {
        assert_eq!(field_context("email", "u-42"), "email:u-42");
    }

    #[test]
    fn record_id_accepts_strings_and_numbers() {
        let rec = serde_json::json!({"id": 7, "uuid": "abc", "empty": ""});
        let rec = rec.as_object().unwrap();
        assert_eq!(record_id(rec, "id").as_deref(), Some("7"));
        assert_eq!(record_id(rec, "uuid").as_deref(), Some("abc"));
        assert_eq!(record_id(rec, "empty"), None);
        assert_eq!(record_id(rec, "missing"), None);
    }
}
