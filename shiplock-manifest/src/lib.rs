//! Bundle integrity manifest for ShipLock.
//!
//! A manifest maps each bundled file's relative path to its SHA-256 digest.
//! It is written once at bundle build time as `MANIFEST.json` and checked at
//! every start.
//!
//! The manifest detects modified, missing or replaced files among those it
//! lists. It does not detect files added to the bundle after the fact.

mod builder;
mod digest;
mod error;
mod manifest;
mod pool;
mod verify;

pub use builder::{build_manifest, ManifestBuilder};
pub use digest::file_digest;
pub use error::{ManifestError, ManifestResult};
pub use manifest::{Manifest, DIGEST_ALGORITHM, MANIFEST_FILE, MANIFEST_VERSION};
pub use pool::{PoolConfig, MAX_DEFAULT_WORKERS};
pub use verify::{verify_manifest, verify_manifest_with, ManifestReport, Mismatch, MismatchKind};
