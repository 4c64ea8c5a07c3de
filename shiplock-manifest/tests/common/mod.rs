#![allow(dead_code)]

use std::fs;
use std::path::Path;

use tempfile::TempDir;

/// Creates a temporary bundle containing `files` (relative path, contents).
pub fn bundle(files: &[(&str, &[u8])]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (rel, contents) in files {
        write(dir.path(), rel, contents);
    }
    dir
}

pub fn write(root: &Path, rel: &str, contents: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

pub fn sample_bundle() -> TempDir {
    bundle(&[
        ("app/main.py", b"print('hello')\n"),
        ("app/lib/util.py", b"def f():\n    return 1\n"),
        ("config/settings.json", b"{\"debug\": false}"),
        ("README", b"bundle"),
    ])
}
