//! In-process audit backends.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{AuditBackend, AuditEvent, AuditSink};
use crate::errors::Result;

/// Keeps events in memory.  Clones share the same buffer, so a test can
/// hand one clone to a sink and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

impl AuditBackend for MemoryAuditLog {
    fn write(&mut self, event: &AuditEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Emits each event as a structured `tracing` record under the
/// `fieldseal::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditBackend for TracingAuditLog {
    fn write(&mut self, event: &AuditEvent) -> Result<()> {
        tracing::info!(
            target: "fieldseal::audit",
            operation = event.operation.as_str(),
            table = event.table.as_deref(),
            field = event.field.as_deref(),
            record_id = event.record_id.as_deref(),
            user_id = event.user_id.as_deref(),
            success = event.success,
            error = event.error.as_deref(),
            key_version = event.key_version.as_deref(),
            "audit"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "tracing"
    }
}
