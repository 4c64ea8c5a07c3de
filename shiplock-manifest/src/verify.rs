//! Manifest verification.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::digest::file_digest;
use crate::error::ManifestResult;
use crate::manifest::Manifest;
use crate::pool::{map_bounded, PoolConfig};

/// Why a listed file failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MismatchKind {
    /// Content digest differs.
    Modified { expected: String, actual: String },
    /// Listed file does not exist.
    Missing,
    /// Listed path is a directory, symlink or special file.
    NotAFile,
    /// File exists but could not be read.
    Unreadable { error: String },
    /// Listed path is absolute or escapes the bundle root.
    InvalidPath,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Modified { expected, actual } => {
                write!(f, "modified (expected {expected}, found {actual})")
            }
            Self::Missing => f.write_str("missing"),
            Self::NotAFile => f.write_str("not a regular file"),
            Self::Unreadable { error } => write!(f, "unreadable: {error}"),
            Self::InvalidPath => f.write_str("path escapes bundle root"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub path: String,
    #[serde(flatten)]
    pub kind: MismatchKind,
}

/// Outcome of [`verify_manifest`]. Mismatches are in manifest path order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestReport {
    pub ok: bool,
    pub checked: usize,
    pub mismatches: Vec<Mismatch>,
}

/// Recomputes every listed digest under `root`.
///
/// All mismatches are collected. Files on disk that the manifest does not
/// list are not reported: the manifest vouches for listed files only.
pub fn verify_manifest(root: &Path, manifest: &Manifest) -> ManifestResult<ManifestReport> {
    verify_manifest_with(root, manifest, PoolConfig::default())
}

pub fn verify_manifest_with(
    root: &Path,
    manifest: &Manifest,
    pool: PoolConfig,
) -> ManifestResult<ManifestReport> {
    let entries: Vec<(&String, &String)> = manifest.files.iter().collect();
    let outcomes = map_bounded(&entries, pool, |(rel, expected)| {
        check_entry(root, rel, expected)
    })?;

    let mismatches: Vec<Mismatch> = entries
        .iter()
        .zip(outcomes)
        .filter_map(|((rel, _), kind)| {
            kind.map(|kind| Mismatch {
                path: (*rel).clone(),
                kind,
            })
        })
        .collect();

    for m in &mismatches {
        warn!(path = %m.path, kind = ?m.kind, "manifest mismatch");
    }
    info!(
        root = %root.display(),
        checked = entries.len(),
        mismatches = mismatches.len(),
        "verified bundle manifest"
    );

    Ok(ManifestReport {
        ok: mismatches.is_empty(),
        checked: entries.len(),
        mismatches,
    })
}

fn check_entry(root: &Path, rel: &str, expected: &str) -> Option<MismatchKind> {
    let Some(path) = resolve(root, rel) else {
        return Some(MismatchKind::InvalidPath);
    };
    match fs::symlink_metadata(&path) {
        Err(e) if e.kind() == ErrorKind::NotFound => return Some(MismatchKind::Missing),
        Err(e) => {
            return Some(MismatchKind::Unreadable {
                error: e.to_string(),
            });
        }
        Ok(meta) if !meta.is_file() => return Some(MismatchKind::NotAFile),
        Ok(_) => {}
    }
    match file_digest(&path) {
        Ok(actual) if actual.eq_ignore_ascii_case(expected) => None,
        Ok(actual) => Some(MismatchKind::Modified {
            expected: expected.to_string(),
            actual,
        }),
        Err(e) => Some(MismatchKind::Unreadable {
            error: e.to_string(),
        }),
    }
}

/// Joins a `/`-separated manifest path onto `root`, refusing anything that
/// could name a file outside it.
fn resolve(root: &Path, rel: &str) -> Option<PathBuf> {
    if rel.is_empty() || rel.starts_with('/') || rel.contains('\\') {
        return None;
    }
    let mut path = root.to_path_buf();
    for part in rel.split('/') {
        if part.is_empty() || part == "." || part == ".." || (cfg!(windows) && part.contains(':')) {
            return None;
        }
        path.push(part);
    }
    Some(path)
}
