//! Audit trail for every cryptographic operation.
//!
//! Events carry *what* happened (operation, table, field, record id,
//! user id, outcome, key version) and never *what was protected*: no
//! plaintext, no key bytes, no IVs.
//!
//! Recording is fire-and-forget.  `AsyncAuditSink` hands events to a
//! bounded channel drained by a background worker; when the channel is
//! full the event is dropped and counted rather than blocking the
//! caller.  A failing backend is logged and otherwise ignored.

mod memory;
#[cfg(feature = "audit-log")]
mod sqlite;

pub use memory::{MemoryAuditLog, TracingAuditLog};
#[cfg(feature = "audit-log")]
pub use sqlite::{AuditEntry, SqliteAuditLog};

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::errors::{FieldSealError, Result};

/// Default capacity of the audit channel.
pub const DEFAULT_BUFFER: usize = 1024;

/// The kind of operation being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    EncryptField,
    DecryptField,
    IssueSession,
    ValidateSession,
    IssueCsrf,
    ValidateCsrf,
    CreateBackup,
    RestoreBackup,
    RotateKey,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EncryptField => "encrypt_field",
            Self::DecryptField => "decrypt_field",
            Self::IssueSession => "issue_session",
            Self::ValidateSession => "validate_session",
            Self::IssueCsrf => "issue_csrf",
            Self::ValidateCsrf => "validate_csrf",
            Self::CreateBackup => "create_backup",
            Self::RestoreBackup => "restore_backup",
            Self::RotateKey => "rotate_key",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "encrypt_field" => Self::EncryptField,
            "decrypt_field" => Self::DecryptField,
            "issue_session" => Self::IssueSession,
            "validate_session" => Self::ValidateSession,
            "issue_csrf" => Self::IssueCsrf,
            "validate_csrf" => Self::ValidateCsrf,
            "create_backup" => Self::CreateBackup,
            "restore_backup" => Self::RestoreBackup,
            "rotate_key" => Self::RotateKey,
            _ => return None,
        })
    }
}

impl std::fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub operation: AuditOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_version: Option<String>,
}

impl AuditEvent {
    /// A successful event for `operation`, stamped now.
    pub fn new(operation: AuditOperation) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            table: None,
            field: None,
            record_id: None,
            user_id: None,
            success: true,
            error: None,
            key_version: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn record_id(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn key_version(mut self, version: impl Into<String>) -> Self {
        self.key_version = Some(version.into());
        self
    }

    /// Mark the event failed.  `error` must be one of the crate's error
    /// messages, which never contain protected material.
    pub fn failed(mut self, error: impl std::fmt::Display) -> Self {
        self.success = false;
        self.error = Some(error.to_string());
        self
    }

    /// Set the outcome from a result without consuming it.
    pub fn outcome<T, E: std::fmt::Display>(self, result: &std::result::Result<T, E>) -> Self {
        match result {
            Ok(_) => self,
            Err(e) => self.failed(e),
        }
    }
}

/// Something that accepts audit events.
///
/// Implementations must not block for long and must never fail the
/// caller: `record` has no return value on purpose.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AuditEvent) {}
}

/// A storage backend drained by `AsyncAuditSink`'s worker.
pub trait AuditBackend: Send + 'static {
    fn write(&mut self, event: &AuditEvent) -> Result<()>;

    fn name(&self) -> &str;
}

/// Non-blocking sink: events go through a bounded channel to a worker
/// thread that owns the backend.
///
/// Dropping the sink closes the channel and waits for the worker to
/// finish writing what was already queued.
pub struct AsyncAuditSink {
    sender: Option<mpsc::Sender<AuditEvent>>,
    worker: Option<JoinHandle<()>>,
    dropped: AtomicU64,
    name: String,
}

impl AsyncAuditSink {
    /// Start a worker thread draining into `backend`.
    pub fn spawn<B: AuditBackend>(mut backend: B, buffer: usize) -> Result<Self> {
        let (sender, mut receiver) = mpsc::channel::<AuditEvent>(buffer.max(1));
        let name = format!("async({})", backend.name());

        let worker = std::thread::Builder::new()
            .name("fieldseal-audit".into())
            .spawn(move || {
                while let Some(event) = receiver.blocking_recv() {
                    if let Err(e) = backend.write(&event) {
                        tracing::error!(backend = backend.name(), "audit write failed: {e}");
                    }
                }
                tracing::debug!("audit worker stopped");
            })
            .map_err(|e| FieldSealError::Audit(format!("cannot start audit worker: {e}")))?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            dropped: AtomicU64::new(0),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Events discarded because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting events and wait for the worker to drain the
    /// channel.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for AsyncAuditSink {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl AuditSink for AsyncAuditSink {
    fn record(&self, event: AuditEvent) {
        let Some(sender) = &self.sender else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    operation = event.operation.as_str(),
                    "audit channel full, event dropped"
                );
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("audit worker gone, event dropped");
            }
        }
    }
}

impl std::fmt::Debug for AsyncAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncAuditSink")
            .field("name", &self.name)
            .field("dropped", &self.dropped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;

    struct GatedBackend {
        gate: std_mpsc::Receiver<()>,
        seen: MemoryAuditLog,
    }

    impl AuditBackend for GatedBackend {
        fn write(&mut self, event: &AuditEvent) -> Result<()> {
            let _ = self.gate.recv();
            self.seen.write(event)
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    struct FailingBackend;

    impl AuditBackend for FailingBackend {
        fn write(&mut self, _event: &AuditEvent) -> Result<()> {
            Err(FieldSealError::Audit("disk full".into()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn builder_sets_fields_and_outcome() {
        let err: std::result::Result<(), FieldSealError> =
            Err(FieldSealError::Decryption("authentication failed"));
        let event = AuditEvent::new(AuditOperation::DecryptField)
            .table("users")
            .field("email")
            .record_id("u-42")
            .key_version("v1")
            .outcome(&err);

        assert!(!event.success);
        assert_eq!(event.table.as_deref(), Some("users"));
        assert_eq!(
            event.error.as_deref(),
            Some("Decryption failed: authentication failed")
        );
    }

    #[test]
    fn operation_names_round_trip() {
        for op in [
            AuditOperation::EncryptField,
            AuditOperation::ValidateCsrf,
            AuditOperation::RotateKey,
        ] {
            assert_eq!(AuditOperation::parse(op.as_str()), Some(op));
        }
        assert_eq!(AuditOperation::parse("nope"), None);
    }

    #[test]
    fn async_sink_delivers_events() {
        let memory = MemoryAuditLog::new();
        let sink = AsyncAuditSink::spawn(memory.clone(), 16).unwrap();
        assert_eq!(sink.name(), "async(memory)");

        sink.record(AuditEvent::new(AuditOperation::EncryptField).field("email"));
        sink.record(AuditEvent::new(AuditOperation::DecryptField).field("email"));
        sink.close();

        let events = memory.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].operation, AuditOperation::EncryptField);
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (open_gate, gate) = std_mpsc::channel();
        let seen = MemoryAuditLog::new();
        let sink = AsyncAuditSink::spawn(
            GatedBackend {
                gate,
                seen: seen.clone(),
            },
            1,
        )
        .unwrap();

        // The worker holds at most one event while blocked on the gate and
        // the channel holds one more; everything else must be dropped.
        for _ in 0..10 {
            sink.record(AuditEvent::new(AuditOperation::CreateBackup));
        }
        assert!(sink.dropped() >= 8);

        for _ in 0..10 {
            let _ = open_gate.send(());
        }
        sink.close();
        assert!(seen.len() <= 2);
    }

    #[test]
    fn failing_backend_never_reaches_the_caller() {
        let sink = AsyncAuditSink::spawn(FailingBackend, 4).unwrap();
        sink.record(AuditEvent::new(AuditOperation::RotateKey));
        sink.close();
    }
}
