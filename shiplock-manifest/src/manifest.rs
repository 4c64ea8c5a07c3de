//! The bundle manifest file (`MANIFEST.json`).

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ManifestError, ManifestResult};

/// Conventional manifest file name at the bundle root.
pub const MANIFEST_FILE: &str = "MANIFEST.json";

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Digest algorithm recorded in every manifest.
pub const DIGEST_ALGORITHM: &str = "sha256";

/// A versioned mapping of `/`-separated relative path to hex content digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
    pub files: BTreeMap<String, String>,
}

impl Manifest {
    /// Wraps a path to digest mapping, stamped with the current time.
    pub fn new(files: BTreeMap<String, String>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            algorithm: DIGEST_ALGORITHM.to_string(),
            created_at: Utc::now().trunc_subsecs(0),
            files,
        }
    }

    /// Parses and checks version and algorithm.
    pub fn from_slice(bytes: &[u8]) -> ManifestResult<Self> {
        let manifest: Self = serde_json::from_slice(bytes)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedVersion(manifest.version));
        }
        if manifest.algorithm != DIGEST_ALGORITHM {
            return Err(ManifestError::UnsupportedAlgorithm(manifest.algorithm));
        }
        Ok(manifest)
    }

    pub fn read(path: &Path) -> ManifestResult<Self> {
        let bytes = fs::read(path).map_err(|e| ManifestError::io(path, e))?;
        Self::from_slice(&bytes)
    }

    pub fn to_json(&self) -> ManifestResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the manifest and syncs it to disk.
    pub fn write(&self, path: &Path) -> ManifestResult<()> {
        let json = self.to_json()?;
        let mut file = fs::File::create(path).map_err(|e| ManifestError::io(path, e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| ManifestError::io(path, e))?;
        file.sync_all().map_err(|e| ManifestError::io(path, e))
    }

    /// Recorded digest for `path`, if listed.
    pub fn digest(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
