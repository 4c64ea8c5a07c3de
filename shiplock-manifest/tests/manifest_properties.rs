mod common;

use std::collections::BTreeMap;

use proptest::prelude::*;
use shiplock_manifest::{build_manifest, verify_manifest, MismatchKind};

fn tree() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(
        "[a-z]{1,6}(/[a-z]{1,6}){0,2}\\.txt",
        prop::collection::vec(any::<u8>(), 0..256),
        1..12,
    )
}

fn materialize(files: &BTreeMap<String, Vec<u8>>) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (rel, contents) in files {
        common::write(dir.path(), rel, contents);
    }
    dir
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn build_then_verify_is_ok(files in tree()) {
        let dir = materialize(&files);
        let manifest = build_manifest(dir.path(), |_| true).unwrap();
        prop_assert_eq!(manifest.len(), files.len());
        let report = verify_manifest(dir.path(), &manifest).unwrap();
        prop_assert!(report.ok);
        prop_assert!(report.mismatches.is_empty());
    }

    #[test]
    fn any_edit_is_detected(files in tree(), pick in any::<prop::sample::Index>(), extra in any::<u8>()) {
        let dir = materialize(&files);
        let manifest = build_manifest(dir.path(), |_| true).unwrap();

        let (rel, contents) = files.iter().nth(pick.index(files.len())).unwrap();
        let mut changed = contents.clone();
        changed.push(extra);
        common::write(dir.path(), rel, &changed);

        let report = verify_manifest(dir.path(), &manifest).unwrap();
        prop_assert_eq!(report.mismatches.len(), 1);
        prop_assert_eq!(&report.mismatches[0].path, rel);
        let is_modified = matches!(report.mismatches[0].kind, MismatchKind::Modified { .. });
        prop_assert!(is_modified);
    }
}
