//! Local activation record.
//!
//! After a license first verifies on a machine, the launcher may record
//! `{license_id, activated_at, machine_id}` in a small JSON file. The record
//! is informational: it is never consulted in place of verification.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{LicenseError, LicenseResult};
use crate::keys::write_file;
use crate::verifier::Verification;

const ACTIVATION_DIR: &str = ".shiplock";
const ACTIVATION_FILE: &str = "activation.json";

/// A persisted activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    pub license_id: Uuid,
    #[serde(with = "crate::payload::timestamp")]
    pub activated_at: DateTime<Utc>,
    /// Machine id from the license, for machine-bound licenses.
    pub machine_id: Option<String>,
}

/// File-backed activation record.
#[derive(Debug, Clone)]
pub struct ActivationStore {
    path: PathBuf,
}

impl ActivationStore {
    /// Uses an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.shiplock/activation.json`.
    pub fn default_path() -> LicenseResult<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(ACTIVATION_DIR).join(ACTIVATION_FILE))
            .ok_or_else(|| LicenseError::ActivationFailed("no home directory".into()))
    }

    /// Store at [`default_path`](Self::default_path).
    pub fn open_default() -> LicenseResult<Self> {
        Self::default_path().map(Self::new)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the record, creating the parent directory if needed.
    pub fn save(&self, activation: &Activation) -> LicenseResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| LicenseError::io(parent, e))?;
        }
        let json = serde_json::to_vec_pretty(activation)?;
        write_file(&self.path, &json)
    }

    /// Reads the record, or `None` if there is none yet.
    pub fn load(&self) -> LicenseResult<Option<Activation>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(LicenseError::io(&self.path, e)),
        }
    }

    /// True if a readable record exists.
    #[must_use]
    pub fn is_activated(&self) -> bool {
        matches!(self.load(), Ok(Some(_)))
    }

    /// True if the stored record is for `license_id`.
    #[must_use]
    pub fn is_activated_for(&self, license_id: Uuid) -> bool {
        matches!(self.load(), Ok(Some(a)) if a.license_id == license_id)
    }

    /// Removes the record. Missing records are not an error.
    pub fn clear(&self) -> LicenseResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(LicenseError::io(&self.path, e)),
        }
    }
}

/// Records an activation for a verified license.
///
/// # Errors
///
/// [`LicenseError::ActivationFailed`] if `verification` is not valid.
pub fn activate(
    store: &ActivationStore,
    verification: &Verification,
    clock: &dyn Clock,
) -> LicenseResult<Activation> {
    let payload = match verification {
        Verification::Valid { payload } => payload,
        Verification::Invalid { reason, detail, .. } => {
            return Err(LicenseError::ActivationFailed(format!("{reason}: {detail}")));
        }
    };
    let activation = Activation {
        license_id: payload.license_id,
        activated_at: clock.now(),
        machine_id: payload.machine_id.clone(),
    };
    store.save(&activation)?;
    info!(license_id = %activation.license_id, path = %store.path().display(), "license activated");
    Ok(activation)
}
