#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use shiplock_crypto::KdfParams;
use shiplock_gate::GateConfig;
use shiplock_license::{
    Expiry, FingerprintComponents, FingerprintProvider, FixedClock, KeyAlgorithm, KeyManager,
    KeyPair, LicenseError, LicenseIssuer, LicenseRequest, LicenseResult, LicenseVerifier,
    MachineFingerprint, StaticFingerprint,
};
use shiplock_manifest::{build_manifest, MANIFEST_FILE};
use tempfile::TempDir;

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn machine(serial: &str) -> MachineFingerprint {
    MachineFingerprint::from_components(&FingerprintComponents {
        hardware_serial: Some(serial.into()),
        hostname: Some("gate-host".into()),
        ..Default::default()
    })
    .unwrap()
}

pub fn keypair() -> KeyPair {
    KeyManager::new()
        .with_kdf_params(KdfParams {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        })
        .generate_key_pair(KeyAlgorithm::Ed25519)
        .unwrap()
}

pub fn verifier(now: DateTime<Utc>, serial: &str) -> LicenseVerifier {
    LicenseVerifier::new()
        .with_clock(FixedClock(now))
        .with_fingerprint_provider(StaticFingerprint(machine(serial)))
}

/// Provider for a machine with no readable identifiers.
pub struct NoFingerprint;

impl FingerprintProvider for NoFingerprint {
    fn compute(&self) -> LicenseResult<MachineFingerprint> {
        Err(LicenseError::FingerprintUnavailable)
    }
}

/// A verifier running on a machine whose fingerprint cannot be read.
pub fn blind_verifier(now: DateTime<Utc>) -> LicenseVerifier {
    LicenseVerifier::new()
        .with_clock(FixedClock(now))
        .with_fingerprint_provider(NoFingerprint)
}

/// A bundle with a manifest, a license bound to machine "SN-1" expiring at
/// the end of 2025-12-31, and the vendor public key.
pub struct Fixture {
    pub dir: TempDir,
    pub key: KeyPair,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let key = keypair();
        let fixture = Self { dir, key };

        let bundle = fixture.bundle_root();
        fs::create_dir_all(bundle.join("app")).unwrap();
        fs::write(bundle.join("app/main.py"), b"print('ok')\n").unwrap();
        fs::write(bundle.join("app/data.bin"), [1u8, 2, 3]).unwrap();
        build_manifest(&bundle, |_| true)
            .unwrap()
            .write(&bundle.join(MANIFEST_FILE))
            .unwrap();

        let issuer = LicenseIssuer::new()
            .with_clock(FixedClock(utc(2025, 6, 1)))
            .with_fingerprint_provider(StaticFingerprint(machine("SN-1")));
        let artifact = issuer
            .issue(
                LicenseRequest::new("P-1", "Acme")
                    .expires(Expiry::parse_input("2025-12-31").unwrap())
                    .machine_bound(true),
                &fixture.key,
            )
            .unwrap();
        issuer.write(&artifact, &fixture.license_path()).unwrap();

        fs::write(fixture.public_key_path(), fixture.key.public_key().to_pem().unwrap()).unwrap();
        fixture
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn bundle_root(&self) -> PathBuf {
        self.path().join("bundle")
    }

    pub fn license_path(&self) -> PathBuf {
        self.path().join("license.key")
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.path().join("shiplock_public.key")
    }

    pub fn config(&self) -> GateConfig {
        let mut config = GateConfig::new(self.bundle_root(), self.license_path());
        config.trusted_public_key = Some(self.public_key_path());
        config
    }
}
