//! The explicitly constructed service bundle.
//!
//! `FieldSeal` owns one `KeyManager` and hands the same cipher, clock
//! and audit sink to every codec.  There is no global state: tests
//! build one with a fixed key and a `ManualClock`; the CLI builds one
//! from `Settings` and the master-key environment variable.

use std::path::Path;
use std::sync::Arc;

use crate::audit::{AsyncAuditSink, AuditSink, NullAuditSink, TracingAuditLog};
use crate::backup::BackupCodec;
use crate::clock::{system_clock, SharedClock};
use crate::config::{master_key_from_env, Settings};
use crate::crypto::{AeadCipher, HashingService, KeyManager, MasterKey};
use crate::errors::Result;
use crate::fields::FieldCodec;
use crate::tokens::TokenService;

/// All FieldSeal services sharing one key manager.
pub struct FieldSeal {
    keys: Arc<KeyManager>,
    cipher: AeadCipher,
    fields: FieldCodec,
    tokens: TokenService,
    backups: BackupCodec,
    hashing: HashingService,
}

impl FieldSeal {
    pub fn builder(master: MasterKey) -> FieldSealBuilder {
        FieldSealBuilder {
            master,
            retired: Vec::new(),
            settings: Settings::default(),
            clock: system_clock(),
            audit: Arc::new(NullAuditSink),
        }
    }

    /// Load settings from `project_dir`, the master key and any retired
    /// keys from their environment variables, and open the audit log.
    ///
    /// Any configuration problem is returned as an error and must stop
    /// startup.
    pub fn from_env(project_dir: &Path) -> Result<Self> {
        let settings = Settings::load(project_dir)?;
        let mut builder = Self::builder(master_key_from_env(&settings.master_key_env)?);
        for (version, var) in &settings.retired_keys {
            builder = builder.retired_key(version, master_key_from_env(var)?);
        }

        let audit = open_audit_sink(&settings, project_dir)?;
        builder.settings(settings).audit(audit).build()
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    pub fn cipher(&self) -> &AeadCipher {
        &self.cipher
    }

    pub fn fields(&self) -> &FieldCodec {
        &self.fields
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn backups(&self) -> &BackupCodec {
        &self.backups
    }

    pub fn hashing(&self) -> &HashingService {
        &self.hashing
    }
}

/// Builder for `FieldSeal`.
pub struct FieldSealBuilder {
    master: MasterKey,
    retired: Vec<(String, MasterKey)>,
    settings: Settings,
    clock: SharedClock,
    audit: Arc<dyn AuditSink>,
}

impl FieldSealBuilder {
    /// Register an earlier key version for decryption only.
    pub fn retired_key(mut self, version: &str, master: MasterKey) -> Self {
        self.retired.push((version.to_string(), master));
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn build(self) -> Result<FieldSeal> {
        let Self {
            master,
            retired,
            settings,
            clock,
            audit,
        } = self;
        settings.validate()?;

        let keys = Arc::new(
            KeyManager::with_version(master, &settings.key_version, settings.key_options()?)?
                .with_clock(Arc::clone(&clock))
                .with_audit(Arc::clone(&audit)),
        );
        for (version, master) in retired {
            keys.add_retired_key(&version, master)?;
        }
        let cipher = AeadCipher::new(Arc::clone(&keys));

        let fields = FieldCodec::new(cipher.clone(), settings.tables.clone(), Arc::clone(&audit))
            .with_policy(settings.decrypt_policy);
        let tokens = TokenService::new(cipher.clone(), Arc::clone(&clock), Arc::clone(&audit))
            .with_session_ttl(settings.session_ttl()?)
            .with_csrf_max_age(settings.csrf_max_age()?);
        let backups = BackupCodec::new(cipher.clone(), clock, audit);
        let hashing = HashingService::new(settings.kdf_iterations)?;

        Ok(FieldSeal {
            keys,
            cipher,
            fields,
            tokens,
            backups,
            hashing,
        })
    }
}

/// Start the non-blocking audit sink: SQLite under `audit_dir` when
/// available, otherwise structured `tracing` output.
pub fn open_audit_sink(settings: &Settings, project_dir: &Path) -> Result<Arc<dyn AuditSink>> {
    #[cfg(feature = "audit-log")]
    {
        let dir = settings.audit_path(project_dir);
        if std::fs::create_dir_all(&dir).is_ok() {
            if let Some(log) = crate::audit::SqliteAuditLog::open(&dir) {
                return Ok(Arc::new(AsyncAuditSink::spawn(log, settings.audit_buffer)?));
            }
        }
        tracing::warn!(dir = %dir.display(), "audit database unavailable, logging audit events via tracing");
    }
    #[cfg(not(feature = "audit-log"))]
    let _ = project_dir;

    Ok(Arc::new(AsyncAuditSink::spawn(
        TracingAuditLog,
        settings.audit_buffer,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::MIN_ITERATIONS;

    #[test]
    fn build_rejects_invalid_settings() {
        let settings = Settings {
            kdf_iterations: 1,
            ..Settings::default()
        };
        let result = FieldSeal::builder(MasterKey::generate())
            .settings(settings)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn services_share_one_key_manager() {
        let settings = Settings {
            kdf_iterations: MIN_ITERATIONS,
            key_version: "k7".into(),
            ..Settings::default()
        };
        let seal = FieldSeal::builder(MasterKey::generate())
            .settings(settings)
            .build()
            .unwrap();

        let env = seal.cipher().encrypt(b"x", None).unwrap();
        assert_eq!(env.key_version, "k7");
        assert_eq!(seal.hashing().iterations(), MIN_ITERATIONS);

        seal.keys().rotate_key("primary");
        let env2 = seal.cipher().encrypt(b"x", None).unwrap();
        assert_ne!(env2.key_version, "k7");
        assert_eq!(seal.cipher().decrypt(&env, None).unwrap(), b"x");
    }

    #[test]
    fn retired_keys_open_envelopes_from_before_a_key_change() {
        let settings = |version: &str| Settings {
            kdf_iterations: MIN_ITERATIONS,
            key_version: version.into(),
            ..Settings::default()
        };
        let old = || MasterKey::new(vec![0x31; 32]).unwrap();

        let before = FieldSeal::builder(old()).settings(settings("v1")).build().unwrap();
        let sealed = before.fields().encrypt_field(&"x".into(), "email", "u-1").unwrap();

        let after = FieldSeal::builder(MasterKey::new(vec![0x32; 32]).unwrap())
            .retired_key("v1", old())
            .settings(settings("v2"))
            .build()
            .unwrap();
        assert_eq!(after.keys().versions(), vec!["v1", "v2"]);
        assert_eq!(
            after.fields().decrypt_field(&sealed, "email", "u-1").unwrap(),
            "x"
        );

        let clash = FieldSeal::builder(old())
            .retired_key("v1", old())
            .settings(settings("v1"))
            .build();
        assert!(clash.is_err());
    }
}
