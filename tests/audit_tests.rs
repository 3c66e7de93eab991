//! Integration tests for the audit trail.

#![cfg(feature = "audit-log")]

use std::sync::Arc;

use fieldseal::audit::{AsyncAuditSink, AuditOperation, SqliteAuditLog};
use fieldseal::config::Settings;
use fieldseal::context::open_audit_sink;
use fieldseal::crypto::kdf::MIN_ITERATIONS;
use fieldseal::crypto::MasterKey;
use fieldseal::FieldSeal;
use serde_json::json;
use tempfile::TempDir;

fn settings() -> Settings {
    Settings {
        kdf_iterations: MIN_ITERATIONS,
        ..Settings::default()
    }
}

#[test]
fn operations_land_in_sqlite_after_shutdown() {
    let project = TempDir::new().unwrap();
    let settings = settings();

    {
        let sink = open_audit_sink(&settings, project.path()).unwrap();
        let seal = FieldSeal::builder(MasterKey::new(vec![9; 32]).unwrap())
            .settings(settings.clone())
            .audit(sink)
            .build()
            .unwrap();

        let sealed = seal
            .fields()
            .encrypt_field(&json!("alice@example.com"), "email", "u-42")
            .unwrap();
        let _ = seal.fields().decrypt_field(&sealed, "email", "u-43");
        seal.keys().rotate_key("primary");
        // Dropping the bundle drains the worker.
    }

    let log = SqliteAuditLog::open(&settings.audit_path(project.path())).unwrap();
    let entries = log.query(10, None).unwrap();
    assert_eq!(entries.len(), 3);

    // Most recent first.
    assert_eq!(entries[0].event.operation, AuditOperation::RotateKey);
    assert_eq!(entries[0].event.key_version.as_deref(), Some("v2"));

    let failed = &entries[1].event;
    assert_eq!(failed.operation, AuditOperation::DecryptField);
    assert!(!failed.success);
    assert_eq!(failed.record_id.as_deref(), Some("u-43"));

    let ok = &entries[2].event;
    assert_eq!(ok.operation, AuditOperation::EncryptField);
    assert!(ok.success);
    assert_eq!(ok.field.as_deref(), Some("email"));
}

#[test]
fn sqlite_backend_runs_behind_the_async_sink() {
    let dir = TempDir::new().unwrap();
    let backend = SqliteAuditLog::open(dir.path()).unwrap();
    let sink = Arc::new(AsyncAuditSink::spawn(backend, 8).unwrap());
    assert_eq!(sink.name(), "async(sqlite)");

    let seal = FieldSeal::builder(MasterKey::new(vec![1; 32]).unwrap())
        .settings(settings())
        .audit(sink.clone())
        .build()
        .unwrap();
    seal.tokens().generate_csrf_token();
    drop(seal);

    let sink = Arc::try_unwrap(sink).unwrap();
    assert_eq!(sink.dropped(), 0);
    sink.close();

    let entries = SqliteAuditLog::open(dir.path())
        .unwrap()
        .query(10, None)
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event.operation, AuditOperation::IssueCsrf);
}
