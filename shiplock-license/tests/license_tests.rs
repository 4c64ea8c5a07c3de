mod common;

use chrono::{TimeZone, Utc};
use common::{f1, f2, issuer_at, keypair, utc, verifier_at, NoFingerprint};
use pretty_assertions::assert_eq;
use serde_json::json;
use shiplock_license::{
    integrity_digest, Expiry, FixedClock, LicenseError, LicenseRequest, LicenseVerifier,
    SignedArtifact, Verification, VerifyFailure,
};

fn artifact_bytes(artifact: &SignedArtifact) -> Vec<u8> {
    artifact.to_json().unwrap().into_bytes()
}

// ── Round trip ───────────────────────────────────────────────────

#[test]
fn sign_then_verify_returns_identical_payload() {
    let key = keypair();
    let issuer = issuer_at(utc(2025, 1, 1), f1());
    let payload = issuer
        .create(
            LicenseRequest::new("P-1", "Acme")
                .expires(Expiry::parse_input("2030-01-01").unwrap())
                .feature("seats", 25)
                .feature("modules", json!(["core", "reports"])),
        )
        .unwrap();
    let artifact = issuer.sign(&payload, &key).unwrap();

    let result = verifier_at(utc(2026, 1, 1), f1())
        .verify(&artifact_bytes(&artifact), Some(&key.public_key()));
    assert!(result.is_valid(), "{result:?}");
    assert_eq!(result.payload(), Some(&payload));
}

#[test]
fn license_ids_are_unique() {
    let issuer = issuer_at(utc(2025, 1, 1), f1());
    let a = issuer.create(LicenseRequest::new("P-1", "Acme")).unwrap();
    let b = issuer.create(LicenseRequest::new("P-1", "Acme")).unwrap();
    assert_ne!(a.license_id, b.license_id);
    assert_eq!(a.license_id.get_version_num(), 4);
}

// ── Expiry and machine binding scenario ──────────────────────────

#[test]
fn bound_license_scenario() {
    let key = keypair();
    let artifact = issuer_at(utc(2025, 6, 1), f1())
        .issue(
            LicenseRequest::new("P-1", "Acme")
                .expires(Expiry::parse_input("2025-12-31").unwrap())
                .machine_bound(true),
            &key,
        )
        .unwrap();
    let bytes = artifact_bytes(&artifact);
    let trusted = key.public_key();

    let before = verifier_at(utc(2025, 12, 30), f1()).verify(&bytes, Some(&trusted));
    assert!(before.is_valid(), "{before:?}");

    let other_machine = verifier_at(utc(2025, 12, 30), f2()).verify(&bytes, Some(&trusted));
    assert_eq!(other_machine.reason(), Some(VerifyFailure::MachineMismatch));

    let after = verifier_at(utc(2026, 1, 1), f1()).verify(&bytes, Some(&trusted));
    assert_eq!(after.reason(), Some(VerifyFailure::Expired));
}

#[test]
fn expiry_date_covers_the_whole_day() {
    let key = keypair();
    let artifact = issuer_at(utc(2025, 6, 1), f1())
        .issue(
            LicenseRequest::new("P-1", "Acme").expires(Expiry::parse_input("2025-12-31").unwrap()),
            &key,
        )
        .unwrap();
    let noon = utc(2025, 12, 31) + chrono::Duration::hours(12);
    assert!(verifier_at(noon, f2()).verify(&artifact_bytes(&artifact), None).is_valid());
}

#[test]
fn perpetual_license_ignores_date() {
    let key = keypair();
    let artifact = issuer_at(utc(2025, 6, 1), f1())
        .issue(LicenseRequest::new("P-1", "Acme").machine_bound(true), &key)
        .unwrap();
    let result = verifier_at(utc(2099, 1, 1), f1())
        .verify(&artifact_bytes(&artifact), Some(&key.public_key()));
    assert!(result.is_valid());
    assert_eq!(result.payload().unwrap().expires_at, Expiry::Never);
}

#[test]
fn unbound_license_runs_anywhere() {
    let key = keypair();
    let artifact = issuer_at(utc(2025, 6, 1), f1())
        .issue(LicenseRequest::new("P-1", "Acme"), &key)
        .unwrap();
    let result = verifier_at(utc(2025, 7, 1), f2()).verify(&artifact_bytes(&artifact), None);
    assert!(result.is_valid());
    assert_eq!(result.payload().unwrap().machine_id, None);
}

#[test]
fn bind_to_remote_fingerprint() {
    let key = keypair();
    let artifact = issuer_at(utc(2025, 6, 1), f1())
        .issue(LicenseRequest::new("P-1", "Acme").bind_to(f2()), &key)
        .unwrap();
    let bytes = artifact_bytes(&artifact);
    assert!(verifier_at(utc(2025, 7, 1), f2()).verify(&bytes, None).is_valid());
    assert_eq!(
        verifier_at(utc(2025, 7, 1), f1()).verify(&bytes, None).reason(),
        Some(VerifyFailure::MachineMismatch)
    );
}

#[test]
fn unreadable_fingerprint_is_an_environment_failure() {
    let key = keypair();
    let artifact = issuer_at(utc(2025, 6, 1), f1())
        .issue(LicenseRequest::new("P-1", "Acme").machine_bound(true), &key)
        .unwrap();
    let verifier = LicenseVerifier::new()
        .with_clock(FixedClock(utc(2025, 7, 1)))
        .with_fingerprint_provider(NoFingerprint);

    match verifier.verify(&artifact_bytes(&artifact), Some(&key.public_key())) {
        Verification::Invalid { reason, step, .. } => {
            assert_eq!(reason, VerifyFailure::FingerprintUnavailable);
            assert_eq!(step, "machine");
            assert!(reason.is_environmental());
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unbound_license_needs_no_fingerprint() {
    let key = keypair();
    let artifact = issuer_at(utc(2025, 6, 1), f1())
        .issue(LicenseRequest::new("P-1", "Acme"), &key)
        .unwrap();
    let verifier = LicenseVerifier::new()
        .with_clock(FixedClock(utc(2025, 7, 1)))
        .with_fingerprint_provider(NoFingerprint);
    assert!(verifier.verify(&artifact_bytes(&artifact), None).is_valid());
}

// ── Trust anchor ─────────────────────────────────────────────────

#[test]
fn self_signed_artifact_rejected_by_pinned_key() {
    let vendor = keypair();
    let forger = keypair();
    let artifact = issuer_at(utc(2025, 6, 1), f1())
        .issue(LicenseRequest::new("P-1", "Acme"), &forger)
        .unwrap();
    let bytes = artifact_bytes(&artifact);

    let verifier = verifier_at(utc(2025, 7, 1), f1());
    assert!(verifier.verify(&bytes, None).is_valid());
    assert_eq!(
        verifier.verify(&bytes, Some(&vendor.public_key())).reason(),
        Some(VerifyFailure::SignatureInvalid)
    );
}

#[test]
fn required_trusted_key_must_be_supplied() {
    let key = keypair();
    let artifact = issuer_at(utc(2025, 6, 1), f1())
        .issue(LicenseRequest::new("P-1", "Acme"), &key)
        .unwrap();
    let verifier = verifier_at(utc(2025, 7, 1), f1()).require_trusted_key(true);
    assert_eq!(
        verifier.verify(&artifact_bytes(&artifact), None).reason(),
        Some(VerifyFailure::SignatureInvalid)
    );
    assert!(verifier
        .verify(&artifact_bytes(&artifact), Some(&key.public_key()))
        .is_valid());
}

// ── Tampering ────────────────────────────────────────────────────

#[test]
fn edited_integrity_field_fails_integrity() {
    let key = keypair();
    let mut artifact = issuer_at(utc(2025, 6, 1), f1())
        .issue(LicenseRequest::new("P-1", "Acme"), &key)
        .unwrap();
    artifact.integrity = "0".repeat(64);
    let result = verifier_at(utc(2025, 7, 1), f1()).verify(&artifact_bytes(&artifact), None);
    assert_eq!(result.reason(), Some(VerifyFailure::IntegrityFailed));
}

#[test]
fn forged_payload_with_recomputed_integrity_fails_signature() {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let key = keypair();
    let issuer = issuer_at(utc(2025, 6, 1), f1());
    let mut payload = issuer.create(LicenseRequest::new("P-1", "Acme")).unwrap();
    let mut artifact = issuer.sign(&payload, &key).unwrap();

    payload.client = "Mallory".into();
    artifact.license = STANDARD.encode(payload.canonical_bytes().unwrap());
    artifact.integrity = integrity_digest(&artifact.license, &artifact.signature);

    let result = verifier_at(utc(2025, 7, 1), f1()).verify(&artifact_bytes(&artifact), None);
    assert_eq!(result.reason(), Some(VerifyFailure::SignatureInvalid));
}

#[test]
fn integrity_is_checked_before_signature() {
    let key = keypair();
    let mut artifact = issuer_at(utc(2025, 6, 1), f1())
        .issue(LicenseRequest::new("P-1", "Acme"), &key)
        .unwrap();
    artifact.signature = artifact.signature.chars().rev().collect();
    let result = verifier_at(utc(2025, 7, 1), f1()).verify(&artifact_bytes(&artifact), None);
    assert_eq!(result.reason(), Some(VerifyFailure::IntegrityFailed));
}

#[test]
fn non_canonical_payload_is_malformed() {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let key = keypair();
    let payload = issuer_at(utc(2025, 6, 1), f1())
        .create(LicenseRequest::new("P-1", "Acme"))
        .unwrap();
    let pretty = serde_json::to_vec_pretty(&payload).unwrap();
    let signature = key.sign(&pretty).unwrap();

    let license = STANDARD.encode(&pretty);
    let signature = STANDARD.encode(signature);
    let artifact = SignedArtifact {
        integrity: integrity_digest(&license, &signature),
        license,
        signature,
        public_key: key.public_key().to_pem().unwrap(),
    };
    let result = verifier_at(utc(2025, 7, 1), f1()).verify(&artifact_bytes(&artifact), None);
    assert_eq!(result.reason(), Some(VerifyFailure::Malformed));
}

#[test]
fn garbage_is_malformed() {
    let verifier = verifier_at(utc(2025, 7, 1), f1());
    let inputs: [&[u8]; 3] = [
        b"not json",
        b"{}",
        br#"{"license":"","signature":"a","public_key":"b","integrity":"c"}"#,
    ];
    for input in inputs {
        assert_eq!(verifier.verify(input, None).reason(), Some(VerifyFailure::Malformed));
    }
}

#[test]
fn invalid_result_names_the_failing_step() {
    let verifier = verifier_at(utc(2025, 7, 1), f1());
    match verifier.verify(b"[]", None) {
        Verification::Invalid { step, .. } => assert_eq!(step, "parse"),
        other => panic!("unexpected {other:?}"),
    }
}

// ── Issuance validation ──────────────────────────────────────────

#[test]
fn blank_product_or_client_rejected() {
    let issuer = issuer_at(utc(2025, 6, 1), f1());
    assert!(matches!(
        issuer.create(LicenseRequest::new("", "Acme")),
        Err(LicenseError::InvalidPayload(_))
    ));
    assert!(matches!(
        issuer.create(LicenseRequest::new("P-1", "  ")),
        Err(LicenseError::InvalidPayload(_))
    ));
}

#[test]
fn expiry_before_issuance_rejected() {
    let issuer = issuer_at(utc(2026, 10, 19), f1());
    let result = issuer.create_license(
        "P-1",
        "Acme",
        Some(Expiry::parse_input("2025-12-31").unwrap()),
        false,
        None,
    );
    assert!(matches!(result, Err(LicenseError::InvalidPayload(_))));
}

#[test]
fn sign_rejects_inconsistent_payload() {
    let key = keypair();
    let issuer = issuer_at(utc(2025, 6, 1), f1());
    let mut payload = issuer.create(LicenseRequest::new("P-1", "Acme")).unwrap();
    payload.machine_bound = true;
    assert!(matches!(
        issuer.sign(&payload, &key),
        Err(LicenseError::InvalidPayload(_))
    ));
}

#[test]
fn sign_rejects_sub_second_timestamps() {
    let key = keypair();
    let issuer = issuer_at(utc(2025, 6, 1), f1());
    let fractional = Utc.timestamp_opt(1_748_736_000, 250_000_000).unwrap();

    let mut payload = issuer.create(LicenseRequest::new("P-1", "Acme")).unwrap();
    payload.issued_at = fractional;
    assert!(matches!(
        issuer.sign(&payload, &key),
        Err(LicenseError::InvalidPayload(msg)) if msg.contains("issued_at")
    ));

    let mut payload = issuer.create(LicenseRequest::new("P-1", "Acme")).unwrap();
    payload.expires_at = Expiry::At(fractional + chrono::Duration::days(30));
    assert!(matches!(
        issuer.sign(&payload, &key),
        Err(LicenseError::InvalidPayload(msg)) if msg.contains("expires_at")
    ));
}

#[test]
fn sign_rejects_uppercase_machine_id() {
    let key = keypair();
    let issuer = issuer_at(utc(2025, 6, 1), f1());
    let mut payload = issuer
        .create(LicenseRequest::new("P-1", "Acme").machine_bound(true))
        .unwrap();
    payload.machine_id = Some(f1().as_str().to_ascii_uppercase());
    assert!(matches!(
        issuer.sign(&payload, &key),
        Err(LicenseError::InvalidPayload(_))
    ));

    payload.machine_id = Some(f1().as_str().to_string());
    let artifact = issuer.sign(&payload, &key).unwrap();
    assert!(verifier_at(utc(2025, 7, 1), f1())
        .verify(&artifact_bytes(&artifact), Some(&key.public_key()))
        .is_valid());
}

#[test]
fn five_digit_expiry_year_rejected() {
    assert!(matches!(
        Expiry::parse_input("+10000-01-01"),
        Err(LicenseError::InvalidPayload(_))
    ));
    assert!(Expiry::parse_input("9999-12-31").is_ok());

    let key = keypair();
    let issuer = issuer_at(utc(2025, 6, 1), f1());
    let mut payload = issuer.create(LicenseRequest::new("P-1", "Acme")).unwrap();
    payload.expires_at = Expiry::At(Utc.with_ymd_and_hms(10_000, 1, 1, 0, 0, 0).unwrap());
    assert!(matches!(
        issuer.sign(&payload, &key),
        Err(LicenseError::InvalidPayload(_))
    ));
}

#[test]
fn issued_at_has_whole_seconds() {
    let now = utc(2025, 6, 1) + chrono::Duration::milliseconds(1500);
    let payload = issuer_at(now, f1())
        .create(LicenseRequest::new("P-1", "Acme"))
        .unwrap();
    assert_eq!(payload.issued_at, utc(2025, 6, 1) + chrono::Duration::seconds(1));
}

// ── Artifact file ────────────────────────────────────────────────

#[test]
fn write_and_read_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("license.key");
    let key = keypair();
    let issuer = issuer_at(utc(2025, 6, 1), f1());
    let artifact = issuer.issue(LicenseRequest::new("P-1", "Acme"), &key).unwrap();
    issuer.write(&artifact, &path).unwrap();

    let read = SignedArtifact::read(&path).unwrap();
    assert_eq!(read, artifact);

    let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let mut fields: Vec<_> = raw.as_object().unwrap().keys().cloned().collect();
    fields.sort();
    assert_eq!(fields, ["integrity", "license", "public_key", "signature"]);
}

#[test]
fn payload_schema_field_names() {
    let payload = issuer_at(utc(2025, 6, 1), f1())
        .create(LicenseRequest::new("P-1", "Acme").machine_bound(true))
        .unwrap();
    let value: serde_json::Value =
        serde_json::from_slice(&payload.canonical_bytes().unwrap()).unwrap();
    assert_eq!(value["issued_at"], "2025-06-01T00:00:00Z");
    assert_eq!(value["expires_at"], "never");
    assert_eq!(value["machine_bound"], true);
    assert_eq!(value["machine_id"], f1().as_str());
    assert!(value["features"].as_object().unwrap().is_empty());
}

// ── Concurrency ──────────────────────────────────────────────────

#[test]
fn one_key_signs_from_many_threads() {
    let key = keypair();
    let issuer = issuer_at(utc(2025, 6, 1), f1());
    let verifier = verifier_at(utc(2025, 7, 1), f1());

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let (key, issuer, verifier) = (&key, &issuer, &verifier);
                s.spawn(move || {
                    let artifact = issuer
                        .issue(LicenseRequest::new("P-1", format!("client-{i}")), key)
                        .unwrap();
                    verifier.verify(&artifact_bytes(&artifact), Some(&key.public_key()))
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_valid());
        }
    });
}
