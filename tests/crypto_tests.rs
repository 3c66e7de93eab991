//! Integration tests for the FieldSeal crypto module.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use chrono::{Duration, TimeZone, Utc};
use fieldseal::audit::{AuditOperation, MemoryAuditLog};
use fieldseal::clock::ManualClock;
use fieldseal::crypto::kdf::MIN_ITERATIONS;
use fieldseal::crypto::{AeadCipher, EncryptedEnvelope, KeyManager, KeyOptions, MasterKey};
use fieldseal::FieldSealError;

fn options() -> KeyOptions {
    KeyOptions {
        iterations: MIN_ITERATIONS,
        rotation_interval: Duration::days(90),
        cache_capacity: 64,
    }
}

fn cipher() -> AeadCipher {
    let keys = KeyManager::new(MasterKey::new(vec![0x42; 32]).unwrap(), options()).unwrap();
    AeadCipher::new(Arc::new(keys))
}

// ---------------------------------------------------------------------------
// Encryption round-trip
// ---------------------------------------------------------------------------

#[test]
fn encrypt_decrypt_roundtrip() {
    let c = cipher();
    let plaintext = b"4111 1111 1111 1111";

    let env = c.encrypt(plaintext, Some(b"card:u-42")).expect("encrypt");
    assert_eq!(env.salt.len(), 32);
    assert_eq!(env.iv.len(), 16);
    assert_eq!(env.tag.len(), 16);
    assert_eq!(env.ciphertext.len(), plaintext.len());

    let recovered = c.decrypt(&env, Some(b"card:u-42")).expect("decrypt");
    assert_eq!(recovered, plaintext);
}

#[test]
fn envelope_survives_json_transport() {
    let c = cipher();
    let env = c.encrypt_str("hello", "greeting:1").unwrap();

    let json = env.to_json().unwrap();
    assert!(json.contains("\"keyVersion\":\"v1\""));

    let parsed = EncryptedEnvelope::from_json(&json).unwrap();
    assert_eq!(parsed, env);
    assert_eq!(c.decrypt_str(&parsed, "greeting:1").unwrap(), "hello");
}

#[test]
fn encrypt_is_fresh_every_time() {
    let c = cipher();
    let a = c.encrypt(b"same", Some(b"ctx")).unwrap();
    let b = c.encrypt(b"same", Some(b"ctx")).unwrap();

    assert_ne!(a.salt, b.salt, "salt must be fresh per envelope");
    assert_ne!(a.iv, b.iv, "iv must be fresh per envelope");
    assert_ne!(a.ciphertext, b.ciphertext);
}

// ---------------------------------------------------------------------------
// Context binding and tamper detection
// ---------------------------------------------------------------------------

#[test]
fn wrong_context_fails_closed() {
    let c = cipher();
    let env = c.encrypt(b"secret", Some(b"email:u-42")).unwrap();

    for wrong in [&b"email:u-43"[..], &b"phone:u-42"[..], &b""[..]] {
        assert!(matches!(
            c.decrypt(&env, Some(wrong)),
            Err(FieldSealError::Decryption("authentication failed"))
        ));
    }
}

#[test]
fn any_bit_flip_is_detected() {
    let c = cipher();
    let env = c.encrypt(b"do not touch", Some(b"ctx")).unwrap();

    let mut flipped = env.clone();
    flipped.ciphertext[0] ^= 0x01;
    assert!(c.decrypt(&flipped, Some(b"ctx")).is_err());

    let mut flipped = env.clone();
    flipped.tag[15] ^= 0x80;
    assert!(c.decrypt(&flipped, Some(b"ctx")).is_err());

    let mut flipped = env.clone();
    flipped.iv[3] ^= 0x10;
    assert!(c.decrypt(&flipped, Some(b"ctx")).is_err());

    // A different salt derives a different key.
    let mut flipped = env.clone();
    flipped.salt[31] ^= 0x01;
    assert!(c.decrypt(&flipped, Some(b"ctx")).is_err());

    assert_eq!(c.decrypt(&env, Some(b"ctx")).unwrap(), b"do not touch");
}

#[test]
fn malformed_envelope_is_rejected() {
    let c = cipher();
    let mut env = c.encrypt(b"x", None).unwrap();
    env.iv.truncate(12);
    assert!(matches!(
        c.decrypt(&env, None),
        Err(FieldSealError::Decryption(_))
    ));

    assert!(EncryptedEnvelope::from_json("{\"ciphertext\":1}").is_err());
    assert!(EncryptedEnvelope::from_json("not json").is_err());
}

#[test]
fn different_master_key_cannot_decrypt() {
    let c = cipher();
    let env = c.encrypt(b"secret", None).unwrap();

    let other = KeyManager::new(MasterKey::new(vec![0x24; 32]).unwrap(), options()).unwrap();
    let other = AeadCipher::new(Arc::new(other));
    assert!(other.decrypt(&env, None).is_err());
}

// ---------------------------------------------------------------------------
// Key derivation and cache
// ---------------------------------------------------------------------------

#[test]
fn derivation_is_deterministic_and_cached() {
    let keys = KeyManager::new(MasterKey::new(vec![1; 32]).unwrap(), options()).unwrap();
    let (_, master) = keys.active_key().unwrap();

    let a = keys.derive_key(&master, &[9; 32]).unwrap();
    let b = keys.derive_key(&master, &[9; 32]).unwrap();
    assert_eq!(a.as_bytes(), b.as_bytes());
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(keys.cached_keys(), 1);

    let c = keys.derive_key(&master, &[8; 32]).unwrap();
    assert_ne!(a.as_bytes(), c.as_bytes());
    assert_eq!(keys.cached_keys(), 2);
}

#[test]
fn stale_cache_entries_are_recomputed() {
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let keys = KeyManager::new(MasterKey::new(vec![1; 32]).unwrap(), options())
        .unwrap()
        .with_clock(clock.clone());
    let (_, master) = keys.active_key().unwrap();

    let first = keys.derive_key(&master, &[5; 32]).unwrap();
    assert_eq!(first.created_at(), start);

    clock.advance(Duration::days(90));
    let same = keys.derive_key(&master, &[5; 32]).unwrap();
    assert!(Arc::ptr_eq(&first, &same), "exactly at the TTL is still fresh");

    clock.advance(Duration::seconds(1));
    let again = keys.derive_key(&master, &[5; 32]).unwrap();
    assert!(!Arc::ptr_eq(&first, &again));
    assert_eq!(again.created_at(), start + Duration::days(90) + Duration::seconds(1));
    assert_eq!(first.as_bytes(), again.as_bytes());
}

#[test]
fn cache_stays_bounded_under_many_encryptions() {
    let opts = KeyOptions {
        cache_capacity: 16,
        ..options()
    };
    let keys = Arc::new(KeyManager::new(MasterKey::new(vec![2; 32]).unwrap(), opts).unwrap());
    let c = AeadCipher::new(Arc::clone(&keys));

    let envelopes: Vec<_> = (0..200)
        .map(|i| c.encrypt_str(&format!("value {i}"), "email:u-1").unwrap())
        .collect();
    assert_eq!(keys.cached_keys(), 16);

    // Evicted entries are simply derived again.
    assert_eq!(c.decrypt_str(&envelopes[0], "email:u-1").unwrap(), "value 0");
    assert!(keys.cached_keys() <= 16);
}

// ---------------------------------------------------------------------------
// Rotation
// ---------------------------------------------------------------------------

#[test]
fn rotation_is_safe_with_operations_in_flight() {
    let keys = Arc::new(KeyManager::new(MasterKey::new(vec![4; 32]).unwrap(), options()).unwrap());
    let c = AeadCipher::new(Arc::clone(&keys));

    let sealed: Vec<(EncryptedEnvelope, String, String)> = thread::scope(|s| {
        let workers: Vec<_> = (0..4)
            .map(|w| {
                let c = c.clone();
                s.spawn(move || {
                    let mut out = Vec::new();
                    for n in 0..25 {
                        let context = format!("field:w{w}-{n}");
                        let plaintext = format!("payload {w}/{n}");
                        let env = c.encrypt_str(&plaintext, &context).unwrap();
                        assert_eq!(c.decrypt_str(&env, &context).unwrap(), plaintext);
                        out.push((env, context, plaintext));
                    }
                    out
                })
            })
            .collect();

        let rotator = s.spawn(|| {
            for _ in 0..5 {
                keys.rotate_key("primary");
                thread::yield_now();
            }
        });

        rotator.join().unwrap();
        workers
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    assert_eq!(sealed.len(), 100);
    assert_eq!(keys.versions().len(), 6);
    assert_eq!(keys.active_version(), "v6");

    let known: HashSet<String> = keys.versions().into_iter().collect();
    for (env, context, plaintext) in &sealed {
        assert!(known.contains(&env.key_version));
        assert_eq!(&c.decrypt_str(env, context).unwrap(), plaintext);

        // The envelope only opens under the version it was sealed with.
        let mut relabelled = env.clone();
        relabelled.key_version = if env.key_version == "v1" { "v2" } else { "v1" }.into();
        assert!(c.decrypt_str(&relabelled, context).is_err());
    }
}

#[test]
fn rotation_keeps_old_envelopes_readable() {
    let audit = MemoryAuditLog::new();
    let keys = Arc::new(
        KeyManager::new(MasterKey::new(vec![3; 32]).unwrap(), options())
            .unwrap()
            .with_audit(Arc::new(audit.clone())),
    );
    let c = AeadCipher::new(Arc::clone(&keys));

    let old = c.encrypt(b"before", Some(b"ctx")).unwrap();
    assert_eq!(old.key_version, "v1");

    let rotation = keys.rotate_key("primary");
    assert_eq!(rotation.key_id, "primary");
    assert_eq!(rotation.old_version, "v1");
    assert_eq!(rotation.new_version, "v2");
    assert_ne!(rotation.old_fingerprint, rotation.new_fingerprint);
    assert_eq!(keys.active_version(), "v2");
    assert_eq!(keys.versions(), vec!["v1", "v2"]);

    let new = c.encrypt(b"after", Some(b"ctx")).unwrap();
    assert_eq!(new.key_version, "v2");

    assert_eq!(c.decrypt(&old, Some(b"ctx")).unwrap(), b"before");
    assert_eq!(c.decrypt(&new, Some(b"ctx")).unwrap(), b"after");

    let rotations: Vec<_> = audit
        .events()
        .into_iter()
        .filter(|e| e.operation == AuditOperation::RotateKey)
        .collect();
    assert_eq!(rotations.len(), 1);
    assert_eq!(rotations[0].key_version.as_deref(), Some("v2"));
}

#[test]
fn retired_keys_decrypt_but_never_encrypt() {
    let old_master = || MasterKey::new(vec![7; 32]).unwrap();
    let legacy = AeadCipher::new(Arc::new(KeyManager::new(old_master(), options()).unwrap()));
    let env = legacy.encrypt(b"legacy", None).unwrap();

    let keys = KeyManager::with_version(MasterKey::new(vec![8; 32]).unwrap(), "v2", options())
        .unwrap();
    keys.add_retired_key("v1", old_master()).unwrap();
    let c = AeadCipher::new(Arc::new(keys));

    assert_eq!(c.decrypt(&env, None).unwrap(), b"legacy");
    assert_eq!(c.encrypt(b"x", None).unwrap().key_version, "v2");
}

#[test]
fn short_master_key_is_rejected() {
    assert!(MasterKey::new(vec![0; 31]).is_err());
    assert!(MasterKey::new(vec![0; 32]).is_ok());
}
