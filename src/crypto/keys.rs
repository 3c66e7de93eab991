//! Master-key ring, derived-key cache and key rotation.
//!
//! The `KeyManager` is constructed explicitly and injected into every
//! service that needs key material.  It holds:
//! - a ring of master keys, one per key version (`"v1"`, `"v2"`, ...),
//!   exactly one of which is active for new encryptions;
//! - a cache of PBKDF2-derived keys keyed by `(fingerprint, salt)`,
//!   never by the raw secret.
//!
//! Rotation adds a new active master key.  Retired versions stay in the
//! ring so envelopes sealed under them remain decryptable.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::kdf::{self, KEY_LEN};
use crate::audit::{AuditEvent, AuditOperation, AuditSink, NullAuditSink};
use crate::clock::{system_clock, SharedClock};
use crate::errors::{FieldSealError, Result};

/// Minimum accepted master secret length in bytes.
pub const MIN_MASTER_KEY_LEN: usize = 32;

/// Default lifetime of a cached derived key.
pub const DEFAULT_ROTATION_DAYS: i64 = 90;

/// Default maximum number of cached derived keys.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// The process-wide master secret.  Zeroed when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: Vec<u8>,
}

impl MasterKey {
    /// Wrap raw secret bytes, rejecting secrets that are too short.
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < MIN_MASTER_KEY_LEN {
            let len = bytes.len();
            let mut bytes = bytes;
            bytes.zeroize();
            return Err(FieldSealError::Configuration(format!(
                "master key must be at least {MIN_MASTER_KEY_LEN} bytes (got {len})"
            )));
        }
        Ok(Self { bytes })
    }

    /// Generate a fresh random 32-byte master key.
    pub fn generate() -> Self {
        Self {
            bytes: kdf::random_bytes::<KEY_LEN>().to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// SHA-256 of the secret, hex encoded.  Safe to log and to use as a
    /// map key.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A PBKDF2 output plus the instant it was computed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
    #[zeroize(skip)]
    created_at: DateTime<Utc>,
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("created_at", &self.created_at)
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Tunables for the key manager.
#[derive(Debug, Clone, Copy)]
pub struct KeyOptions {
    /// PBKDF2 iteration count.
    pub iterations: u32,
    /// Maximum age of a cached derived key.
    pub rotation_interval: Duration,
    /// Maximum number of cached derived keys.  Every encryption draws a
    /// fresh salt, so without a bound the cache grows per call.
    pub cache_capacity: usize,
}

impl Default for KeyOptions {
    fn default() -> Self {
        Self {
            iterations: kdf::DEFAULT_ITERATIONS,
            rotation_interval: Duration::days(DEFAULT_ROTATION_DAYS),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Result of a master-key rotation.  Carries handles, never key bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRotation {
    pub key_id: String,
    pub old_version: String,
    pub new_version: String,
    pub old_fingerprint: String,
    pub new_fingerprint: String,
    pub rotated_at: DateTime<Utc>,
}

struct KeyRing {
    keys: HashMap<String, Arc<MasterKey>>,
    active: String,
}

impl KeyRing {
    fn next_version(&self) -> String {
        let mut n = self.keys.len() + 1;
        loop {
            let candidate = format!("v{n}");
            if !self.keys.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

type CacheKey = (String, Vec<u8>);

/// Holds master keys and hands out derived keys.
pub struct KeyManager {
    ring: RwLock<KeyRing>,
    cache: RwLock<HashMap<CacheKey, Arc<DerivedKey>>>,
    options: KeyOptions,
    clock: SharedClock,
    audit: Arc<dyn AuditSink>,
}

impl KeyManager {
    /// Create a manager whose active key is `master` under version `"v1"`.
    pub fn new(master: MasterKey, options: KeyOptions) -> Result<Self> {
        Self::with_version(master, "v1", options)
    }

    /// Create a manager with an explicit version label for the active key.
    pub fn with_version(master: MasterKey, version: &str, options: KeyOptions) -> Result<Self> {
        kdf::validate_iterations(options.iterations)?;
        if options.rotation_interval <= Duration::zero() {
            return Err(FieldSealError::Configuration(
                "rotation interval must be positive".into(),
            ));
        }
        if options.cache_capacity == 0 {
            return Err(FieldSealError::Configuration(
                "derived key cache capacity must be at least 1".into(),
            ));
        }
        if version.is_empty() {
            return Err(FieldSealError::Configuration(
                "key version must not be empty".into(),
            ));
        }

        let mut keys = HashMap::new();
        keys.insert(version.to_string(), Arc::new(master));

        Ok(Self {
            ring: RwLock::new(KeyRing {
                keys,
                active: version.to_string(),
            }),
            cache: RwLock::new(HashMap::new()),
            options,
            clock: system_clock(),
            audit: Arc::new(NullAuditSink),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Send rotation events to `audit`.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn options(&self) -> KeyOptions {
        self.options
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Register a retired key version so envelopes sealed under it can
    /// still be opened (e.g. after a process restart).
    pub fn add_retired_key(&self, version: &str, master: MasterKey) -> Result<()> {
        let mut ring = self.ring.write();
        if ring.keys.contains_key(version) {
            return Err(FieldSealError::Configuration(format!(
                "key version '{version}' is already registered"
            )));
        }
        ring.keys.insert(version.to_string(), Arc::new(master));
        Ok(())
    }

    /// Version label of the key used for new encryptions.
    pub fn active_version(&self) -> String {
        self.ring.read().active.clone()
    }

    /// The active version and its master key.
    pub fn active_key(&self) -> Result<(String, Arc<MasterKey>)> {
        let ring = self.ring.read();
        let key = ring
            .keys
            .get(&ring.active)
            .cloned()
            .ok_or_else(|| FieldSealError::Encryption("master key unavailable".into()))?;
        Ok((ring.active.clone(), key))
    }

    /// Look up the master key for a stored key version.
    pub fn master_for(&self, version: &str) -> Option<Arc<MasterKey>> {
        self.ring.read().keys.get(version).cloned()
    }

    /// All registered versions, sorted.
    pub fn versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self.ring.read().keys.keys().cloned().collect();
        versions.sort();
        versions
    }

    /// Derive (or fetch from cache) the key for `secret` + `salt`.
    ///
    /// Identical inputs inside the rotation window always return the
    /// same bytes.  Entries older than the rotation interval are
    /// recomputed rather than served.  Inserting drops stale entries
    /// and, at capacity, the oldest one.
    pub fn derive_key(&self, secret: &MasterKey, salt: &[u8]) -> Result<Arc<DerivedKey>> {
        let cache_key = (secret.fingerprint(), salt.to_vec());
        let now = self.clock.now();

        if let Some(hit) = self.cache.read().get(&cache_key) {
            if !hit.is_stale(now, self.options.rotation_interval) {
                return Ok(Arc::clone(hit));
            }
        }

        tracing::debug!(
            fingerprint = &cache_key.0[..12],
            "derived key cache miss"
        );
        let derived = Arc::new(DerivedKey {
            bytes: kdf::derive_key_bytes(secret.as_bytes(), salt, self.options.iterations)?,
            created_at: now,
        });

        let mut cache = self.cache.write();
        let ttl = self.options.rotation_interval;
        cache.retain(|_, key| !key.is_stale(now, ttl));
        while cache.len() >= self.options.cache_capacity {
            let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, key)| key.created_at)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            cache.remove(&oldest);
        }
        cache.insert(cache_key, Arc::clone(&derived));
        Ok(derived)
    }

    /// Generate a new master key and make it active.
    ///
    /// Envelopes already sealed under the old key are untouched; the old
    /// version stays registered for decryption.
    pub fn rotate_key(&self, key_id: &str) -> KeyRotation {
        let new_key = MasterKey::generate();
        let new_fingerprint = new_key.fingerprint();
        let rotated_at = self.clock.now();

        let (old_version, old_fingerprint, new_version) = {
            let mut ring = self.ring.write();
            let old_version = ring.active.clone();
            let old_fingerprint = ring
                .keys
                .get(&old_version)
                .map(|k| k.fingerprint())
                .unwrap_or_default();
            let new_version = ring.next_version();
            ring.keys.insert(new_version.clone(), Arc::new(new_key));
            ring.active = new_version.clone();
            (old_version, old_fingerprint, new_version)
        };

        let purged = self.purge_expired();
        tracing::info!(
            key_id,
            %old_version,
            %new_version,
            %rotated_at,
            purged,
            "master key rotated"
        );
        self.audit.record(
            AuditEvent::new(AuditOperation::RotateKey)
                .record_id(key_id)
                .key_version(&new_version),
        );

        KeyRotation {
            key_id: key_id.to_string(),
            old_version,
            new_version,
            old_fingerprint,
            new_fingerprint,
            rotated_at,
        }
    }

    /// Drop every cached derived key older than the rotation interval.
    ///
    /// Key bytes are zeroed once the last in-flight user releases them.
    /// Returns the number of evicted entries.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.options.rotation_interval;
        let mut cache = self.cache.write();
        let before = cache.len();
        cache.retain(|_, key| !key.is_stale(now, ttl));
        before - cache.len()
    }

    /// Number of cached derived keys.
    pub fn cached_keys(&self) -> usize {
        self.cache.read().len()
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("active_version", &self.active_version())
            .field("versions", &self.versions())
            .field("cached_keys", &self.cached_keys())
            .finish()
    }
}
