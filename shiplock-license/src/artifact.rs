//! The signed license artifact as written to disk.
//!
//! ```json
//! {
//!   "license": "<base64 canonical payload>",
//!   "signature": "<base64 Ed25519 signature over the canonical payload>",
//!   "public_key": "-----BEGIN PUBLIC KEY-----\n...",
//!   "integrity": "<hex digest, see integrity module>"
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LicenseError, LicenseResult};
use crate::keys::{write_file, PublicKey};

/// A license file. Field names are the on-disk contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedArtifact {
    /// Base64 of the canonical payload bytes.
    pub license: String,
    /// Base64 of the signature over the canonical payload bytes.
    pub signature: String,
    /// PEM public key of the signer. A convenience copy, not a trust anchor.
    pub public_key: String,
    /// Hex integrity digest over `license` and `signature`.
    pub integrity: String,
}

impl SignedArtifact {
    /// Parses an artifact, requiring all four fields to be non-empty strings.
    pub fn from_slice(bytes: &[u8]) -> LicenseResult<Self> {
        let artifact: Self = serde_json::from_slice(bytes)
            .map_err(|e| LicenseError::Malformed(e.to_string()))?;
        for (name, value) in [
            ("license", &artifact.license),
            ("signature", &artifact.signature),
            ("public_key", &artifact.public_key),
            ("integrity", &artifact.integrity),
        ] {
            if value.trim().is_empty() {
                return Err(LicenseError::Malformed(format!("field '{name}' is empty")));
            }
        }
        Ok(artifact)
    }

    /// Reads and parses an artifact file.
    pub fn read(path: &Path) -> LicenseResult<Self> {
        let bytes = fs::read(path).map_err(|e| LicenseError::io(path, e))?;
        Self::from_slice(&bytes)
    }

    /// Pretty JSON encoding.
    pub fn to_json(&self) -> LicenseResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decodes the embedded public key.
    pub fn embedded_public_key(&self) -> LicenseResult<PublicKey> {
        PublicKey::from_pem(&self.public_key)
    }

    /// Writes the artifact to `path`, flushing and closing the file before
    /// returning on every path.
    pub fn write(&self, path: &Path) -> LicenseResult<()> {
        write_file(path, self.to_json()?.as_bytes())
    }
}
