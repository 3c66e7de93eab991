//! Encrypted table snapshots with an independent plaintext checksum.
//!
//! A snapshot `{tableName, records, createdAt, version}` is serialized,
//! hashed (SHA-256, hex) and then sealed with associated data
//! `"backup:{tableName}"`.  Restoring checks, in order: the AEAD tag,
//! the checksum of the decrypted bytes, and the embedded table name.
//! Any mismatch fails closed and no data is returned.

pub mod file;

pub use file::{read_backup, write_backup};

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::audit::{AuditEvent, AuditOperation, AuditSink};
use crate::clock::SharedClock;
use crate::crypto::{generate_secure_id, AeadCipher, EncryptedEnvelope};
use crate::errors::{FieldSealError, Result};

/// Snapshot format version.
pub const BACKUP_FORMAT_VERSION: &str = "1.0";

/// Prefix of generated backup ids.
const BACKUP_ID_PREFIX: &str = "bkp";

/// Associated data binding a backup to its table.
pub fn backup_context(table: &str) -> String {
    format!("backup:{table}")
}

/// SHA-256 of `bytes`, lowercase hex.
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// The plaintext that gets encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub table_name: String,
    pub records: Vec<Value>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub version: String,
}

/// What a backup job stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEnvelope {
    pub backup_id: String,
    pub encrypted_payload: EncryptedEnvelope,
    /// Hex SHA-256 of the serialized plaintext snapshot.
    pub checksum: String,
}

/// `{success, data?, error?}` as reported to the backup job.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreOutcome {
    pub success: bool,
    pub data: Option<BackupSnapshot>,
    pub error: Option<String>,
}

impl From<Result<BackupSnapshot>> for RestoreOutcome {
    fn from(result: Result<BackupSnapshot>) -> Self {
        match result {
            Ok(snapshot) => Self {
                success: true,
                data: Some(snapshot),
                error: None,
            },
            Err(e) => Self {
                success: false,
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Creates and restores encrypted backups.
pub struct BackupCodec {
    cipher: AeadCipher,
    clock: SharedClock,
    audit: Arc<dyn AuditSink>,
}

impl BackupCodec {
    pub fn new(cipher: AeadCipher, clock: SharedClock, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            cipher,
            clock,
            audit,
        }
    }

    /// Snapshot, checksum and encrypt `records` of `table`.
    pub fn create_encrypted_backup(&self, records: &[Value], table: &str) -> Result<BackupEnvelope> {
        let snapshot = BackupSnapshot {
            table_name: table.to_string(),
            records: records.to_vec(),
            created_at: self.clock.now().trunc_subsecs(3),
            version: BACKUP_FORMAT_VERSION.to_string(),
        };
        let backup_id = generate_secure_id(Some(BACKUP_ID_PREFIX));

        let result = serde_json::to_vec(&snapshot)
            .map_err(|e| FieldSealError::Serialization(format!("snapshot: {e}")))
            .and_then(|plaintext| {
                let checksum = checksum(&plaintext);
                let envelope = self
                    .cipher
                    .encrypt(&plaintext, Some(backup_context(table).as_bytes()))?;
                Ok(BackupEnvelope {
                    backup_id: backup_id.clone(),
                    encrypted_payload: envelope,
                    checksum,
                })
            });

        let mut event = AuditEvent::new(AuditOperation::CreateBackup)
            .table(table)
            .record_id(backup_id.as_str())
            .outcome(&result);
        if let Ok(backup) = &result {
            event = event.key_version(backup.encrypted_payload.key_version.as_str());
            tracing::info!(
                table,
                backup_id = backup.backup_id.as_str(),
                records = records.len(),
                "backup created"
            );
        }
        self.audit.record(event);

        result
    }

    /// Decrypt and verify a backup, returning typed errors.
    pub fn verify_backup(
        &self,
        encrypted: &EncryptedEnvelope,
        expected_checksum: &str,
        table: &str,
    ) -> Result<BackupSnapshot> {
        let result = self.open(encrypted, expected_checksum, table);

        self.audit.record(
            AuditEvent::new(AuditOperation::RestoreBackup)
                .table(table)
                .key_version(encrypted.key_version.as_str())
                .outcome(&result),
        );
        if let Err(e) = &result {
            tracing::warn!(table, "backup restore rejected: {e}");
        }

        result
    }

    /// `verify_backup` reduced to `{success, data?, error?}`.
    pub fn restore_from_backup(
        &self,
        encrypted: &EncryptedEnvelope,
        expected_checksum: &str,
        table: &str,
    ) -> RestoreOutcome {
        self.verify_backup(encrypted, expected_checksum, table).into()
    }

    /// Restore a stored `BackupEnvelope` using its own checksum.
    pub fn restore_envelope(&self, backup: &BackupEnvelope, table: &str) -> RestoreOutcome {
        self.restore_from_backup(&backup.encrypted_payload, &backup.checksum, table)
    }

    fn open(&self, encrypted: &EncryptedEnvelope, expected_checksum: &str, table: &str) -> Result<BackupSnapshot> {
        let plaintext = self
            .cipher
            .decrypt(encrypted, Some(backup_context(table).as_bytes()))?;

        let actual = checksum(&plaintext);
        let expected = expected_checksum.trim().to_ascii_lowercase();
        if !bool::from(actual.as_bytes().ct_eq(expected.as_bytes())) {
            return Err(FieldSealError::ChecksumMismatch);
        }

        let snapshot: BackupSnapshot = serde_json::from_slice(&plaintext)
            .map_err(|e| FieldSealError::Serialization(format!("snapshot: {e}")))?;

        if snapshot.table_name != table {
            return Err(FieldSealError::TableMismatch {
                expected: table.to_string(),
                found: snapshot.table_name,
            });
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_hex_sha256() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn failed_restore_carries_no_data() {
        let outcome = RestoreOutcome::from(Err(FieldSealError::ChecksumMismatch));
        assert!(!outcome.success);
        assert!(outcome.data.is_none());
        assert!(outcome.error.unwrap().contains("Checksum mismatch"));
    }
}
