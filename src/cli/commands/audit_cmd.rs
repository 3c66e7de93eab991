//! `fieldseal audit`: display the audit log.
//!
//! Usage:
//!   fieldseal audit               # show last 50 entries
//!   fieldseal audit --last 20     # show last 20
//!   fieldseal audit --since 12h   # entries from the last 12 hours

use chrono::Utc;

use crate::cli::Cli;
use crate::errors::{FieldSealError, Result};

/// Execute the `audit` command.
#[cfg(feature = "audit-log")]
pub fn execute(cli: &Cli, last: usize, since: Option<&str>) -> Result<()> {
    use crate::audit::SqliteAuditLog;
    use crate::cli::{output, project_dir};
    use crate::config::Settings;

    let project = project_dir(cli)?;
    let settings = Settings::load(&project)?;
    let dir = settings.audit_path(&project);

    if !SqliteAuditLog::db_path(&dir).exists() {
        output::info("No audit entries found.");
        return Ok(());
    }

    let audit = SqliteAuditLog::open(&dir)
        .ok_or_else(|| FieldSealError::Audit("failed to open audit database".into()))?;

    let since_dt = match since {
        Some(s) => Some(parse_duration(s)?),
        None => None,
    };

    let entries = audit.query(last, since_dt)?;

    if entries.is_empty() {
        output::info("No audit entries found.");
        return Ok(());
    }

    print_audit_table(&entries);

    Ok(())
}

#[cfg(not(feature = "audit-log"))]
pub fn execute(_cli: &Cli, _last: usize, since: Option<&str>) -> Result<()> {
    if let Some(s) = since {
        parse_duration(s)?;
    }
    Err(FieldSealError::CommandFailed(
        "this build has no audit database (enable the `audit-log` feature)".into(),
    ))
}

/// Turn an `--since` window such as `90m`, `12h`, `7d` or `2w` into the
/// cutoff instant.
fn parse_duration(input: &str) -> Result<chrono::DateTime<Utc>> {
    let input = input.trim();
    let bad = |why: &str| {
        FieldSealError::CommandFailed(format!("--since '{input}': {why} (try 30m, 24h, 7d or 2w)"))
    };

    let unit = input.chars().last().ok_or_else(|| bad("empty window"))?;
    let amount: i64 = input[..input.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| bad("expected a whole number before the unit"))?;

    let window = match unit {
        'm' => chrono::Duration::try_minutes(amount),
        'h' => chrono::Duration::try_hours(amount),
        'd' => chrono::Duration::try_days(amount),
        'w' => chrono::Duration::try_weeks(amount),
        _ => return Err(bad("unknown unit")),
    }
    .ok_or_else(|| bad("window too large"))?;

    Utc::now()
        .checked_sub_signed(window)
        .ok_or_else(|| bad("window too large"))
}

/// Print audit entries in a formatted table.
#[cfg(feature = "audit-log")]
pub fn print_audit_table(entries: &[crate::audit::AuditEntry]) {
    use comfy_table::{ContentArrangement, Table};
    use console::style;

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Time", "Operation", "Table", "Field", "Record", "Key", "Result",
    ]);

    for entry in entries {
        let e = &entry.event;
        let dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
        let result = if e.success {
            style("ok").green().to_string()
        } else {
            style(e.error.as_deref().unwrap_or("failed")).red().to_string()
        };

        table.add_row(vec![
            e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            colorize_operation(e.operation.as_str()),
            dash(&e.table),
            dash(&e.field),
            dash(&e.record_id),
            dash(&e.key_version),
            result,
        ]);
    }

    println!(
        "{}",
        style(format!("{} audit entries:", entries.len())).bold()
    );
    println!("{table}");
}

/// Colorize operation names for display.
#[cfg_attr(not(feature = "audit-log"), allow(dead_code))]
fn colorize_operation(op: &str) -> String {
    use console::style;

    match op {
        "encrypt_field" | "issue_session" | "issue_csrf" => style(op).green().to_string(),
        "decrypt_field" | "validate_session" | "validate_csrf" => style(op).blue().to_string(),
        "create_backup" | "restore_backup" => style(op).cyan().to_string(),
        "rotate_key" => style(op).yellow().to_string(),
        _ => op.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_of(input: &str) -> chrono::Duration {
        Utc::now() - parse_duration(input).unwrap()
    }

    #[test]
    fn since_accepts_every_unit() {
        assert_eq!(window_of("45m").num_minutes(), 45);
        assert_eq!(window_of("12h").num_hours(), 12);
        assert_eq!(window_of(" 7d ").num_days(), 7);
        assert_eq!(window_of("2w").num_days(), 14);
    }

    #[test]
    fn since_rejects_bad_windows() {
        for bad in ["", "d", "7", "7y", "seven d", "-", "9999999999999999w"] {
            let err = parse_duration(bad).unwrap_err();
            assert!(err.to_string().contains("--since"), "{bad:?}: {err}");
        }
    }

    #[test]
    fn colorize_operation_returns_string() {
        assert!(!colorize_operation("encrypt_field").is_empty());
        assert!(!colorize_operation("rotate_key").is_empty());
        assert!(!colorize_operation("unknown").is_empty());
    }

    #[cfg(feature = "audit-log")]
    #[test]
    fn audit_query_with_since_filter() {
        use crate::audit::{AuditBackend, AuditEvent, AuditOperation, SqliteAuditLog};

        let dir = tempfile::TempDir::new().unwrap();
        let mut audit = SqliteAuditLog::open(dir.path()).unwrap();
        audit
            .write(&AuditEvent::new(AuditOperation::EncryptField).field("email"))
            .unwrap();

        let since = parse_duration("1h").unwrap();
        let entries = audit.query(10, Some(since)).unwrap();
        assert_eq!(entries.len(), 1);
    }
}
