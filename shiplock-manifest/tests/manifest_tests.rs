mod common;

use std::fs;

use common::{bundle, sample_bundle, write};
use pretty_assertions::assert_eq;
use shiplock_manifest::{
    build_manifest, file_digest, verify_manifest, verify_manifest_with, Manifest,
    ManifestBuilder, ManifestError, Mismatch, MismatchKind, PoolConfig, DIGEST_ALGORITHM,
    MANIFEST_FILE, MANIFEST_VERSION,
};

// ── Build ────────────────────────────────────────────────────────

#[test]
fn build_lists_every_regular_file() {
    let dir = sample_bundle();
    let manifest = build_manifest(dir.path(), |_| true).unwrap();

    let paths: Vec<&str> = manifest.files.keys().map(String::as_str).collect();
    assert_eq!(
        paths,
        ["README", "app/lib/util.py", "app/main.py", "config/settings.json"]
    );
    assert_eq!(manifest.version, MANIFEST_VERSION);
    assert_eq!(manifest.algorithm, DIGEST_ALGORITHM);
    assert_eq!(
        manifest.digest("app/main.py").unwrap(),
        file_digest(&dir.path().join("app/main.py")).unwrap()
    );
}

#[test]
fn predicate_filters_files() {
    let dir = sample_bundle();
    let manifest = build_manifest(dir.path(), |rel| rel.ends_with(".py")).unwrap();
    assert_eq!(manifest.len(), 2);
    assert!(manifest.digest("README").is_none());
}

#[test]
fn manifest_excludes_itself() {
    let dir = sample_bundle();
    let first = build_manifest(dir.path(), |_| true).unwrap();
    first.write(&dir.path().join(MANIFEST_FILE)).unwrap();

    let second = build_manifest(dir.path(), |_| true).unwrap();
    assert_eq!(second.files, first.files);
    assert!(second.digest(MANIFEST_FILE).is_none());
}

#[test]
fn explicit_exclusions() {
    let dir = sample_bundle();
    let manifest = ManifestBuilder::new(dir.path())
        .exclude("README")
        .build()
        .unwrap();
    assert!(manifest.digest("README").is_none());
    assert_eq!(manifest.len(), 3);
}

#[test]
fn worker_count_does_not_change_result() {
    let files: Vec<(String, Vec<u8>)> = (0..40)
        .map(|i| (format!("d{}/f{i}.bin", i % 5), vec![i as u8; i * 10]))
        .collect();
    let refs: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(p, c)| (p.as_str(), c.as_slice()))
        .collect();
    let dir = bundle(&refs);

    let serial = ManifestBuilder::new(dir.path()).workers(1).build().unwrap();
    let parallel = ManifestBuilder::new(dir.path()).workers(8).build().unwrap();
    assert_eq!(serial.files, parallel.files);
    assert_eq!(serial.len(), 40);
}

#[test]
fn empty_directory_builds_empty_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = build_manifest(dir.path(), |_| true).unwrap();
    assert!(manifest.is_empty());
    assert!(verify_manifest(dir.path(), &manifest).unwrap().ok);
}

#[test]
fn missing_root_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = build_manifest(&dir.path().join("absent"), |_| true).unwrap_err();
    assert!(matches!(err, ManifestError::Io { .. }));
}

#[test]
fn file_root_is_an_error() {
    let dir = sample_bundle();
    let err = build_manifest(&dir.path().join("README"), |_| true).unwrap_err();
    assert!(matches!(err, ManifestError::NotADirectory(_)));
}

#[cfg(unix)]
#[test]
fn symlinks_are_skipped() {
    let dir = sample_bundle();
    std::os::unix::fs::symlink(dir.path().join("README"), dir.path().join("link")).unwrap();
    let manifest = build_manifest(dir.path(), |_| true).unwrap();
    assert!(manifest.digest("link").is_none());
}

// ── Verify ───────────────────────────────────────────────────────

#[test]
fn fresh_manifest_verifies() {
    let dir = sample_bundle();
    let manifest = build_manifest(dir.path(), |_| true).unwrap();
    let report = verify_manifest(dir.path(), &manifest).unwrap();
    assert!(report.ok);
    assert_eq!(report.checked, 4);
    assert!(report.mismatches.is_empty());
}

#[test]
fn modified_file_reported() {
    let dir = sample_bundle();
    let manifest = build_manifest(dir.path(), |_| true).unwrap();
    write(dir.path(), "app/main.py", b"print('pwned')\n");

    let report = verify_manifest(dir.path(), &manifest).unwrap();
    assert!(!report.ok);
    assert_eq!(report.mismatches.len(), 1);
    let m = &report.mismatches[0];
    assert_eq!(m.path, "app/main.py");
    match &m.kind {
        MismatchKind::Modified { expected, actual } => {
            assert_eq!(expected, manifest.digest("app/main.py").unwrap());
            assert_ne!(expected, actual);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn deleted_file_reported_missing() {
    let dir = sample_bundle();
    let manifest = build_manifest(dir.path(), |_| true).unwrap();
    fs::remove_file(dir.path().join("README")).unwrap();

    let report = verify_manifest(dir.path(), &manifest).unwrap();
    assert_eq!(
        report.mismatches,
        vec![Mismatch {
            path: "README".into(),
            kind: MismatchKind::Missing,
        }]
    );
}

#[test]
fn all_mismatches_collected() {
    let dir = sample_bundle();
    let manifest = build_manifest(dir.path(), |_| true).unwrap();
    fs::remove_file(dir.path().join("README")).unwrap();
    write(dir.path(), "app/lib/util.py", b"changed");
    write(dir.path(), "config/settings.json", b"changed");

    let report = verify_manifest(dir.path(), &manifest).unwrap();
    let paths: Vec<&str> = report.mismatches.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(paths, ["README", "app/lib/util.py", "config/settings.json"]);
    assert_eq!(report.checked, 4);
}

#[test]
fn unlisted_files_not_flagged() {
    let dir = sample_bundle();
    let manifest = build_manifest(dir.path(), |_| true).unwrap();
    write(dir.path(), "app/extra.py", b"import os");
    assert!(verify_manifest(dir.path(), &manifest).unwrap().ok);
}

#[test]
fn directory_in_place_of_file() {
    let dir = sample_bundle();
    let manifest = build_manifest(dir.path(), |_| true).unwrap();
    fs::remove_file(dir.path().join("README")).unwrap();
    fs::create_dir(dir.path().join("README")).unwrap();

    let report = verify_manifest(dir.path(), &manifest).unwrap();
    assert_eq!(report.mismatches[0].kind, MismatchKind::NotAFile);
}

#[test]
fn escaping_entries_are_invalid() {
    let dir = sample_bundle();
    let mut manifest = build_manifest(dir.path(), |_| true).unwrap();
    let digest = manifest.digest("README").unwrap().to_string();
    manifest.files.insert("../outside".into(), digest.clone());
    manifest.files.insert("/etc/hostname".into(), digest);

    let report = verify_manifest_with(dir.path(), &manifest, PoolConfig::with_workers(2)).unwrap();
    let invalid: Vec<&str> = report
        .mismatches
        .iter()
        .filter(|m| m.kind == MismatchKind::InvalidPath)
        .map(|m| m.path.as_str())
        .collect();
    assert_eq!(invalid, ["../outside", "/etc/hostname"]);
}

#[test]
fn uppercase_digest_accepted() {
    let dir = sample_bundle();
    let mut manifest = build_manifest(dir.path(), |_| true).unwrap();
    for digest in manifest.files.values_mut() {
        *digest = digest.to_ascii_uppercase();
    }
    assert!(verify_manifest(dir.path(), &manifest).unwrap().ok);
}

// ── Manifest file ────────────────────────────────────────────────

#[test]
fn manifest_file_round_trip() {
    let dir = sample_bundle();
    let manifest = build_manifest(dir.path(), |_| true).unwrap();
    let path = dir.path().join(MANIFEST_FILE);
    manifest.write(&path).unwrap();
    assert_eq!(Manifest::read(&path).unwrap(), manifest);

    let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(raw["version"], 1);
    assert_eq!(raw["algorithm"], "sha256");
    assert!(raw["files"]["app/main.py"].is_string());
}

#[test]
fn report_serializes_with_kind_tag() {
    let m = Mismatch {
        path: "a".into(),
        kind: MismatchKind::Missing,
    };
    let value = serde_json::to_value(&m).unwrap();
    assert_eq!(value, serde_json::json!({"path": "a", "kind": "missing"}));
}
