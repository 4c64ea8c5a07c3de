//! The two built-in gates: bundle manifest and license.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use shiplock_license::{LicenseVerifier, PublicKey, Verification};
use shiplock_manifest::{verify_manifest_with, Manifest, ManifestError, PoolConfig};
use tracing::info;

use crate::decision::DenyReason;
use crate::gate::{Gate, GateContext, GateOutcome, GateState};

/// Number of mismatched paths named in a deny detail.
const MAX_LISTED_MISMATCHES: usize = 5;

/// Checks the bundle against its manifest.
///
/// A missing or unparseable manifest denies with `IntegrityFailed`: deleting
/// or corrupting the manifest must not get past the gate. Other read errors
/// deny with `Environment`.
#[derive(Debug, Clone)]
pub struct ManifestGate {
    root: PathBuf,
    manifest_path: PathBuf,
    pool: PoolConfig,
}

impl ManifestGate {
    pub fn new(root: impl Into<PathBuf>, manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest_path: manifest_path.into(),
            pool: PoolConfig::default(),
        }
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Gate for ManifestGate {
    fn name(&self) -> &'static str {
        "manifest"
    }

    fn state(&self) -> GateState {
        GateState::ManifestCheck
    }

    fn check(&self, _ctx: &mut GateContext) -> GateOutcome {
        let manifest = match Manifest::read(&self.manifest_path) {
            Ok(m) => m,
            Err(ManifestError::Io { path, source }) if source.kind() != ErrorKind::NotFound => {
                return GateOutcome::fail(
                    DenyReason::Environment,
                    format!("cannot read manifest {}: {source}", path.display()),
                );
            }
            Err(e) => return GateOutcome::fail(DenyReason::IntegrityFailed, e.to_string()),
        };

        let report = match verify_manifest_with(&self.root, &manifest, self.pool) {
            Ok(report) => report,
            Err(e) => return GateOutcome::fail(DenyReason::Environment, e.to_string()),
        };
        if report.ok {
            info!(files = report.checked, "bundle manifest verified");
            return GateOutcome::Pass;
        }

        let listed: Vec<&str> = report
            .mismatches
            .iter()
            .take(MAX_LISTED_MISMATCHES)
            .map(|m| m.path.as_str())
            .collect();
        let more = report.mismatches.len().saturating_sub(listed.len());
        let mut detail = format!(
            "{} of {} files failed: {}",
            report.mismatches.len(),
            report.checked,
            listed.join(", ")
        );
        if more > 0 {
            detail.push_str(&format!(" (+{more} more)"));
        }
        GateOutcome::fail(DenyReason::IntegrityFailed, detail)
    }
}

/// Verifies the license artifact and passes its payload on.
#[derive(Clone)]
pub struct LicenseGate {
    license_path: PathBuf,
    verifier: LicenseVerifier,
    trusted_key: Option<PublicKey>,
}

impl LicenseGate {
    pub fn new(license_path: impl Into<PathBuf>, verifier: LicenseVerifier) -> Self {
        Self {
            license_path: license_path.into(),
            verifier,
            trusted_key: None,
        }
    }

    /// Pins the vendor key; artifacts signed by any other key are denied.
    pub fn with_trusted_key(mut self, key: PublicKey) -> Self {
        self.trusted_key = Some(key);
        self
    }
}

impl Gate for LicenseGate {
    fn name(&self) -> &'static str {
        "license"
    }

    fn state(&self) -> GateState {
        GateState::LicenseCheck
    }

    fn check(&self, ctx: &mut GateContext) -> GateOutcome {
        let bytes = match std::fs::read(&self.license_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                return GateOutcome::fail(
                    DenyReason::Environment,
                    format!("cannot read license {}: {e}", self.license_path.display()),
                );
            }
        };

        match self.verifier.verify(&bytes, self.trusted_key.as_ref()) {
            Verification::Valid { payload } => {
                ctx.payload = Some(payload);
                GateOutcome::Pass
            }
            Verification::Invalid {
                reason,
                step,
                detail,
            } => GateOutcome::fail(reason.into(), format!("{step}: {detail}")),
        }
    }
}
