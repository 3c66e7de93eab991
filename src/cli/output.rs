//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.  Status lines go to stderr
//! so stdout stays clean for piping envelopes and JSON.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::crypto::KeyManager;

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    eprintln!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    eprintln!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    eprintln!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print the key ring (Version, Fingerprint, Active).
pub fn print_key_table(keys: &KeyManager) {
    let active = keys.active_version();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Version", "Fingerprint", "Active"]);

    for version in keys.versions() {
        let fingerprint = keys
            .master_for(&version)
            .map(|m| m.fingerprint()[..16].to_string())
            .unwrap_or_else(|| "-".into());
        let marker = if version == active { "yes" } else { "" };
        table.add_row(vec![version, fingerprint, marker.to_string()]);
    }

    eprintln!("{table}");
}
