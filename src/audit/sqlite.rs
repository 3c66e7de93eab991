//! SQLite-backed audit history at `<audit_dir>/audit.db`.
//!
//! Designed for graceful degradation: if the database can't be opened
//! the caller falls back to another backend, and write errors are
//! reported to the async worker, which logs and moves on.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use super::{AuditBackend, AuditEvent, AuditOperation};
use crate::errors::{FieldSealError, Result};

/// A stored audit event with its row id.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub event: AuditEvent,
}

/// SQLite audit backend.
pub struct SqliteAuditLog {
    conn: Connection,
}

impl SqliteAuditLog {
    /// Open (or create) the audit database at `<dir>/audit.db`.
    ///
    /// Returns `None` if the database can't be opened; callers should
    /// treat this as "audit storage unavailable" and continue normally.
    pub fn open(dir: &Path) -> Option<Self> {
        let db_path = Self::db_path(dir);
        let conn = Connection::open(&db_path).ok()?;

        // Owner-only: the log names tables, fields and users.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&db_path, perms);
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS crypto_audit (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp   TEXT NOT NULL,
                operation   TEXT NOT NULL,
                table_name  TEXT,
                field_name  TEXT,
                record_id   TEXT,
                user_id     TEXT,
                success     INTEGER NOT NULL,
                error       TEXT,
                key_version TEXT
            );",
        )
        .ok()?;

        Some(Self { conn })
    }

    /// Insert one event.
    pub fn insert(&self, event: &AuditEvent) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO crypto_audit
                    (timestamp, operation, table_name, field_name, record_id,
                     user_id, success, error, key_version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    event.timestamp.to_rfc3339(),
                    event.operation.as_str(),
                    event.table,
                    event.field,
                    event.record_id,
                    event.user_id,
                    event.success,
                    event.error,
                    event.key_version,
                ],
            )
            .map_err(|e| FieldSealError::Audit(format!("insert: {e}")))?;
        Ok(())
    }

    /// Query recent audit entries.
    ///
    /// - `limit`: maximum number of entries to return (most recent first).
    /// - `since`: if provided, only return entries newer than this timestamp.
    pub fn query(&self, limit: usize, since: Option<DateTime<Utc>>) -> Result<Vec<AuditEntry>> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let (sql, params): (&str, Vec<Box<dyn rusqlite::types::ToSql>>) = match since {
            Some(ref ts) => (
                "SELECT id, timestamp, operation, table_name, field_name, record_id,
                        user_id, success, error, key_version
                 FROM crypto_audit
                 WHERE timestamp >= ?1
                 ORDER BY id DESC
                 LIMIT ?2",
                vec![
                    Box::new(ts.to_rfc3339()) as Box<dyn rusqlite::types::ToSql>,
                    Box::new(limit_i64),
                ],
            ),
            None => (
                "SELECT id, timestamp, operation, table_name, field_name, record_id,
                        user_id, success, error, key_version
                 FROM crypto_audit
                 ORDER BY id DESC
                 LIMIT ?1",
                vec![Box::new(limit_i64) as Box<dyn rusqlite::types::ToSql>],
            ),
        };

        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| FieldSealError::Audit(format!("query prepare: {e}")))?;

        let params_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| &**p).collect();

        let rows = stmt
            .query_map(params_refs.as_slice(), |row| {
                let ts_str: String = row.get(1)?;
                let timestamp = DateTime::parse_from_rfc3339(&ts_str)
                    .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));
                let op_str: String = row.get(2)?;

                Ok((
                    row.get::<_, i64>(0)?,
                    timestamp,
                    op_str,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, bool>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                ))
            })
            .map_err(|e| FieldSealError::Audit(format!("query exec: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, timestamp, op, table, field, record_id, user_id, success, error, key_version) =
                row.map_err(|e| FieldSealError::Audit(format!("row parse: {e}")))?;
            let operation = AuditOperation::parse(&op)
                .ok_or_else(|| FieldSealError::Audit(format!("unknown operation '{op}'")))?;

            entries.push(AuditEntry {
                id,
                event: AuditEvent {
                    timestamp,
                    operation,
                    table,
                    field,
                    record_id,
                    user_id,
                    success,
                    error,
                    key_version,
                },
            });
        }

        Ok(entries)
    }

    /// Return the path to the audit database (for testing/display).
    pub fn db_path(dir: &Path) -> PathBuf {
        dir.join("audit.db")
    }
}

impl AuditBackend for SqliteAuditLog {
    fn write(&mut self, event: &AuditEvent) -> Result<()> {
        self.insert(event)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_database() {
        let dir = TempDir::new().unwrap();
        let audit = SqliteAuditLog::open(dir.path());
        assert!(audit.is_some(), "should open successfully");
        assert!(dir.path().join("audit.db").exists());
    }

    #[test]
    fn insert_and_query_roundtrip() {
        let dir = TempDir::new().unwrap();
        let audit = SqliteAuditLog::open(dir.path()).unwrap();

        audit
            .insert(
                &AuditEvent::new(AuditOperation::EncryptField)
                    .table("users")
                    .field("email")
                    .record_id("u-42")
                    .key_version("v1"),
            )
            .unwrap();
        audit
            .insert(
                &AuditEvent::new(AuditOperation::DecryptField)
                    .table("users")
                    .field("email")
                    .failed("Decryption failed: authentication failed"),
            )
            .unwrap();

        let entries = audit.query(10, None).unwrap();
        assert_eq!(entries.len(), 2);

        // Most recent first.
        assert_eq!(entries[0].event.operation, AuditOperation::DecryptField);
        assert!(!entries[0].event.success);
        assert_eq!(entries[1].event.record_id.as_deref(), Some("u-42"));
        assert_eq!(entries[1].event.key_version.as_deref(), Some("v1"));
    }

    #[test]
    fn query_with_limit() {
        let dir = TempDir::new().unwrap();
        let audit = SqliteAuditLog::open(dir.path()).unwrap();

        for i in 0..10 {
            audit
                .insert(&AuditEvent::new(AuditOperation::IssueCsrf).record_id(format!("r-{i}")))
                .unwrap();
        }

        let entries = audit.query(3, None).unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn query_with_since_filter() {
        let dir = TempDir::new().unwrap();
        let audit = SqliteAuditLog::open(dir.path()).unwrap();

        audit
            .insert(&AuditEvent::new(AuditOperation::CreateBackup))
            .unwrap();

        let past = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(audit.query(10, Some(past)).unwrap().len(), 1);

        let future = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(audit.query(10, Some(future)).unwrap().len(), 0);
    }

    #[test]
    fn open_returns_none_on_bad_path() {
        let result = SqliteAuditLog::open(Path::new("/nonexistent/path/that/does/not/exist"));
        assert!(result.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn audit_db_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let _audit = SqliteAuditLog::open(dir.path()).unwrap();

        let perms = std::fs::metadata(dir.path().join("audit.db"))
            .unwrap()
            .permissions();
        assert_eq!(perms.mode() & 0o777, 0o600);
    }
}
