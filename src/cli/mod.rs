//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use clap::Parser;
use zeroize::Zeroizing;

use crate::context::FieldSeal;
use crate::errors::{FieldSealError, Result};

/// Environment variable consulted before prompting for a password.
pub const PASSWORD_ENV: &str = "FIELDSEAL_PASSWORD";

/// Environment variable holding the log filter (default: `warn`).
pub const LOG_ENV: &str = "FIELDSEAL_LOG";

/// FieldSeal CLI: field encryption, backups and password hashing.
#[derive(Parser)]
#[command(
    name = "fieldseal",
    about = "Field-level encryption, encrypted backups and password hashing",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project directory holding fieldseal.toml (default: current directory)
    #[arg(short = 'C', long, default_value = ".", global = true)]
    pub dir: String,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Encrypt one field value bound to a record id
    EncryptField {
        /// Field name (e.g. email)
        field: String,
        /// Record id the value belongs to
        record_id: String,
        /// Value to encrypt (omit to read stdin or prompt)
        value: Option<String>,
        /// Parse the value as JSON instead of a plain string
        #[arg(long)]
        json: bool,
    },

    /// Decrypt one field envelope
    DecryptField {
        /// Field name the value was encrypted for
        field: String,
        /// Record id the value was encrypted for
        record_id: String,
        /// Envelope JSON (omit to read stdin)
        envelope: Option<String>,
    },

    /// Encrypt or decrypt the configured fields of a JSON record
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },

    /// Create or restore encrypted table backups
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Hash a password (PBKDF2-HMAC-SHA256) and print it as JSON
    HashPassword {
        /// Iteration count (default: from fieldseal.toml)
        #[arg(long)]
        iterations: Option<u32>,
    },

    /// Check a password against a stored hash
    VerifyPassword {
        /// Stored hash (hex)
        #[arg(long)]
        hash: String,
        /// Stored salt (hex)
        #[arg(long)]
        salt: String,
        /// Iteration count used when hashing
        #[arg(long)]
        iterations: Option<u32>,
    },

    /// Print a random identifier
    GenId {
        /// Optional prefix (e.g. usr -> usr_3f9a...)
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Print a fresh random master key
    GenKey,

    /// Show the loaded master key versions and fingerprints
    Keys,

    /// View the audit log of cryptographic operations
    Audit {
        /// Number of entries to show (default: 50)
        #[arg(long, default_value = "50")]
        last: usize,
        /// Only entries newer than this window (e.g. 30m, 24h, 7d, 2w)
        #[arg(long)]
        since: Option<String>,
    },
}

/// Record subcommands.
#[derive(clap::Subcommand)]
pub enum RecordAction {
    /// Encrypt the sensitive fields of a record
    Encrypt {
        /// Table whose policy applies
        table: String,
        /// JSON file holding the record (omit to read stdin)
        file: Option<String>,
    },

    /// Decrypt every encrypted field of a record
    Decrypt {
        /// Table whose policy applies
        table: String,
        /// JSON file holding the record (omit to read stdin)
        file: Option<String>,
    },
}

/// Backup subcommands.
#[derive(clap::Subcommand)]
pub enum BackupAction {
    /// Encrypt a JSON array of records into a backup file
    Create {
        /// Table the records come from
        table: String,
        /// JSON file holding an array of records
        input: String,
        /// Backup file to write
        #[arg(short, long)]
        output: String,
    },

    /// Verify and decrypt a backup file
    Restore {
        /// Table the backup must belong to
        table: String,
        /// Backup file to read
        file: String,
        /// Write the restored records here (prints to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Install the stderr log subscriber.  The filter comes from
/// `FIELDSEAL_LOG` and defaults to `warn`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Resolve the project directory from the CLI arguments.
pub fn project_dir(cli: &Cli) -> Result<PathBuf> {
    let dir = Path::new(&cli.dir);
    if dir.is_absolute() {
        Ok(dir.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(dir))
    }
}

/// Build the service bundle for this project.  A missing master key is
/// fatal.
pub fn open_seal(cli: &Cli) -> Result<FieldSeal> {
    FieldSeal::from_env(&project_dir(cli)?)
}

/// Get a password, trying in order:
/// 1. `FIELDSEAL_PASSWORD` env var (CI/CD)
/// 2. Interactive prompt
///
/// Returns `Zeroizing<String>` so the password is wiped from memory on drop.
pub fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    let pw = dialoguer::Password::new()
        .with_prompt(prompt)
        .interact()
        .map_err(|e| FieldSealError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Read an input value from, in order: the inline argument, piped
/// stdin, or a hidden interactive prompt.
pub fn read_value(inline: Option<&str>, prompt: &str) -> Result<Zeroizing<String>> {
    if let Some(v) = inline {
        output::warning("Value provided on command line; it may appear in shell history.");
        return Ok(Zeroizing::new(v.to_string()));
    }

    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim_end().len();
        buf.truncate(trimmed);
        return Ok(buf);
    }

    let v = dialoguer::Password::new()
        .with_prompt(prompt)
        .interact()
        .map_err(|e| FieldSealError::CommandFailed(format!("input prompt: {e}")))?;
    Ok(Zeroizing::new(v))
}

/// Read a whole file, or stdin when `path` is `None`.
pub fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(p) => Ok(std::fs::read_to_string(p)?),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Parse JSON input, naming `what` in the error.
pub fn parse_json<T: serde::de::DeserializeOwned>(input: &str, what: &str) -> Result<T> {
    serde_json::from_str(input)
        .map_err(|e| FieldSealError::CommandFailed(format!("invalid {what} JSON: {e}")))
}

/// Pretty-print a serializable value to stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| FieldSealError::Serialization(e.to_string()))?;
    println!("{json}");
    Ok(())
}
