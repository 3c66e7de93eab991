//! `fieldseal backup create|restore`: encrypted table snapshots on disk.
//!
//! Usage:
//!   fieldseal backup create users users.json -o users.fsbak
//!   fieldseal backup restore users users.fsbak -o restored.json

use std::path::Path;

use serde_json::Value;

use crate::backup::{read_backup, write_backup};
use crate::cli::{open_seal, output, parse_json, print_json, read_input, Cli};
use crate::errors::{FieldSealError, Result};

/// Execute `backup create`.
pub fn execute_create(cli: &Cli, table: &str, input: &str, out: &str) -> Result<()> {
    let records: Vec<Value> = parse_json(&read_input(Some(input))?, "records")?;

    let seal = open_seal(cli)?;
    let backup = seal.backups().create_encrypted_backup(&records, table)?;
    write_backup(Path::new(out), &backup)?;

    output::success(&format!(
        "Backup {} written to {out} ({} records, key {})",
        backup.backup_id,
        records.len(),
        backup.encrypted_payload.key_version
    ));
    output::tip(&format!("Restore it with: fieldseal backup restore {table} {out}"));

    Ok(())
}

/// Execute `backup restore`.  Any integrity failure is an error and no
/// records are written.
pub fn execute_restore(cli: &Cli, table: &str, file: &str, out: Option<&str>) -> Result<()> {
    let backup = read_backup(Path::new(file))?;

    let seal = open_seal(cli)?;
    let outcome = seal.backups().restore_envelope(&backup, table);
    let snapshot = match (outcome.success, outcome.data) {
        (true, Some(snapshot)) => snapshot,
        _ => {
            return Err(FieldSealError::CommandFailed(format!(
                "restore of {} failed: {}",
                backup.backup_id,
                outcome.error.unwrap_or_else(|| "unknown error".into())
            )))
        }
    };

    match out {
        Some(path) => {
            let json = serde_json::to_vec_pretty(&snapshot.records)
                .map_err(|e| FieldSealError::Serialization(e.to_string()))?;
            std::fs::write(path, json)?;
            output::success(&format!(
                "Restored {} records from {} (created {})",
                snapshot.records.len(),
                backup.backup_id,
                snapshot.created_at.format("%Y-%m-%d %H:%M:%S")
            ));
        }
        None => print_json(&snapshot.records)?,
    }

    Ok(())
}
