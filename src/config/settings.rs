use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::crypto::kdf;
use crate::crypto::keys::{KeyOptions, DEFAULT_CACHE_CAPACITY};
use crate::errors::{FieldSealError, Result};
use crate::fields::{DecryptPolicy, SensitiveFields};

/// Process-level configuration, loaded from `fieldseal.toml`.
///
/// Every field has a sensible default so FieldSeal works out-of-the-box
/// without any config file at all.  The master secret itself never
/// lives here; only the name of the environment variable holding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Environment variable holding the master secret.
    #[serde(default = "default_master_key_env")]
    pub master_key_env: String,

    /// Version label of the master key loaded at startup.
    #[serde(default = "default_key_version")]
    pub key_version: String,

    /// Earlier key versions kept for decryption only, mapped to the
    /// environment variable holding each secret:
    ///
    /// ```toml
    /// [retired_keys]
    /// v1 = "FIELDSEAL_MASTER_KEY_V1"
    /// ```
    #[serde(default)]
    pub retired_keys: BTreeMap<String, String>,

    /// PBKDF2 iteration count (default: 100 000).
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Maximum age of a cached derived key, in days (default: 90).
    #[serde(default = "default_rotation_interval_days")]
    pub rotation_interval_days: i64,

    /// Maximum number of cached derived keys (default: 1024).
    #[serde(default = "default_key_cache_capacity")]
    pub key_cache_capacity: usize,

    /// Session token lifetime in hours (default: 24).
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,

    /// CSRF token validity window in seconds (default: 3600).
    #[serde(default = "default_csrf_max_age_secs")]
    pub csrf_max_age_secs: i64,

    /// Directory (relative to the project root) holding `audit.db`.
    #[serde(default = "default_audit_dir")]
    pub audit_dir: String,

    /// Capacity of the non-blocking audit channel.
    #[serde(default = "default_audit_buffer")]
    pub audit_buffer: usize,

    /// What whole-record decryption does with a field that fails.
    #[serde(default)]
    pub decrypt_policy: DecryptPolicy,

    /// Per-table sensitive field configuration.
    #[serde(default)]
    pub tables: SensitiveFields,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_master_key_env() -> String {
    "FIELDSEAL_MASTER_KEY".to_string()
}

fn default_key_version() -> String {
    "v1".to_string()
}

fn default_kdf_iterations() -> u32 {
    kdf::DEFAULT_ITERATIONS
}

fn default_rotation_interval_days() -> i64 {
    90
}

fn default_key_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_session_ttl_hours() -> i64 {
    24
}

fn default_csrf_max_age_secs() -> i64 {
    3600
}

fn default_audit_dir() -> String {
    ".fieldseal".to_string()
}

fn default_audit_buffer() -> usize {
    crate::audit::DEFAULT_BUFFER
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            master_key_env: default_master_key_env(),
            key_version: default_key_version(),
            retired_keys: BTreeMap::new(),
            kdf_iterations: default_kdf_iterations(),
            rotation_interval_days: default_rotation_interval_days(),
            key_cache_capacity: default_key_cache_capacity(),
            session_ttl_hours: default_session_ttl_hours(),
            csrf_max_age_secs: default_csrf_max_age_secs(),
            audit_dir: default_audit_dir(),
            audit_buffer: default_audit_buffer(),
            decrypt_policy: DecryptPolicy::default(),
            tables: SensitiveFields::default(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    pub const FILE_NAME: &'static str = "fieldseal.toml";

    /// Load settings from `<project_dir>/fieldseal.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed or fails validation, an
    /// error is returned.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            FieldSealError::Configuration(format!(
                "Failed to parse {}: {e}",
                config_path.display()
            ))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that would weaken or break the crypto layer.
    pub fn validate(&self) -> Result<()> {
        kdf::validate_iterations(self.kdf_iterations)
            .map_err(|e| FieldSealError::Configuration(e.to_string()))?;

        self.key_options()?;
        self.session_ttl()?;
        self.csrf_max_age()?;

        if self.master_key_env.trim().is_empty() {
            return Err(FieldSealError::Configuration(
                "master_key_env must name an environment variable".into(),
            ));
        }
        if self.key_version.trim().is_empty() {
            return Err(FieldSealError::Configuration(
                "key_version must not be empty".into(),
            ));
        }

        for (version, var) in &self.retired_keys {
            if version.trim().is_empty() || var.trim().is_empty() {
                return Err(FieldSealError::Configuration(
                    "retired_keys entries need a version and an environment variable".into(),
                ));
            }
            if *version == self.key_version {
                return Err(FieldSealError::Configuration(format!(
                    "retired key '{version}' is also the active key_version"
                )));
            }
        }

        Ok(())
    }

    /// Convert the KDF settings into crypto-layer options.
    pub fn key_options(&self) -> Result<KeyOptions> {
        if self.key_cache_capacity == 0 {
            return Err(FieldSealError::Configuration(
                "key_cache_capacity must be at least 1".into(),
            ));
        }
        Ok(KeyOptions {
            iterations: self.kdf_iterations,
            rotation_interval: window(
                "rotation_interval_days",
                self.rotation_interval_days,
                Duration::try_days,
            )?,
            cache_capacity: self.key_cache_capacity,
        })
    }

    pub fn session_ttl(&self) -> Result<Duration> {
        window("session_ttl_hours", self.session_ttl_hours, Duration::try_hours)
    }

    pub fn csrf_max_age(&self) -> Result<Duration> {
        window("csrf_max_age_secs", self.csrf_max_age_secs, Duration::try_seconds)
    }

    /// Full path of the audit directory.
    pub fn audit_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.audit_dir)
    }
}

/// Longest accepted time window, in days.
const MAX_WINDOW_DAYS: i64 = 36_500;

/// Convert a configured window, rejecting zero, negative and absurdly
/// large values before they reach date arithmetic.
fn window(name: &str, value: i64, unit: fn(i64) -> Option<Duration>) -> Result<Duration> {
    if value <= 0 {
        return Err(FieldSealError::Configuration(format!(
            "{name} must be positive (got {value})"
        )));
    }
    unit(value)
        .filter(|d| *d <= Duration::days(MAX_WINDOW_DAYS))
        .ok_or_else(|| {
            FieldSealError::Configuration(format!(
                "{name} is out of range (got {value}, limit {MAX_WINDOW_DAYS} days)"
            ))
        })
}

// ── Tests ────────────────────────────────────────────────────────────
