//! Shared test helpers for license tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use shiplock_crypto::KdfParams;
use shiplock_license::{
    FingerprintComponents, FingerprintProvider, FixedClock, KeyAlgorithm, KeyManager, KeyPair,
    LicenseError, LicenseIssuer, LicenseResult, LicenseVerifier, MachineFingerprint,
    StaticFingerprint,
};

/// Key manager with cheap Argon2id parameters.
pub fn fast_key_manager() -> KeyManager {
    KeyManager::new().with_kdf_params(KdfParams {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
    })
}

pub fn keypair() -> KeyPair {
    fast_key_manager()
        .generate_key_pair(KeyAlgorithm::Ed25519)
        .unwrap()
}

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn machine(serial: &str, host: &str) -> MachineFingerprint {
    MachineFingerprint::from_components(&FingerprintComponents {
        hardware_serial: Some(serial.into()),
        system_instance_id: Some(format!("{serial}-instance")),
        hostname: Some(host.into()),
        primary_mac: Some("02:42:ac:11:00:02".into()),
    })
    .unwrap()
}

/// Fingerprint "F1".
pub fn f1() -> MachineFingerprint {
    machine("SN-0001", "build-host-1")
}

/// Fingerprint "F2".
pub fn f2() -> MachineFingerprint {
    machine("SN-0002", "build-host-2")
}

pub fn issuer_at(now: DateTime<Utc>, fingerprint: MachineFingerprint) -> LicenseIssuer {
    LicenseIssuer::new()
        .with_clock(FixedClock(now))
        .with_fingerprint_provider(StaticFingerprint(fingerprint))
}

pub fn verifier_at(now: DateTime<Utc>, fingerprint: MachineFingerprint) -> LicenseVerifier {
    LicenseVerifier::new()
        .with_clock(FixedClock(now))
        .with_fingerprint_provider(StaticFingerprint(fingerprint))
}

/// Provider for a machine with no readable identifiers.
pub struct NoFingerprint;

impl FingerprintProvider for NoFingerprint {
    fn compute(&self) -> LicenseResult<MachineFingerprint> {
        Err(LicenseError::FingerprintUnavailable)
    }
}
