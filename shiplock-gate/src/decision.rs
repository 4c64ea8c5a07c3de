//! Gate decisions and the launcher exit code contract.

use std::fmt;

use serde::Serialize;
use shiplock_license::{LicensePayload, VerifyFailure};

/// Exit code for ALLOW.
pub const EXIT_ALLOW: i32 = 0;
/// Exit code for a usage or configuration error, before any gate ran.
pub const EXIT_USAGE: i32 = 1;
pub const EXIT_MALFORMED: i32 = 2;
pub const EXIT_INTEGRITY_FAILED: i32 = 3;
pub const EXIT_SIGNATURE_INVALID: i32 = 4;
pub const EXIT_EXPIRED: i32 = 5;
pub const EXIT_MACHINE_MISMATCH: i32 = 6;
pub const EXIT_ENVIRONMENT: i32 = 7;

/// Why the gate denied execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    Malformed,
    IntegrityFailed,
    SignatureInvalid,
    Expired,
    MachineMismatch,
    /// The host could not supply what a check needed (unreadable file,
    /// no fingerprint). Not evidence of tampering.
    Environment,
}

impl DenyReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Malformed => EXIT_MALFORMED,
            Self::IntegrityFailed => EXIT_INTEGRITY_FAILED,
            Self::SignatureInvalid => EXIT_SIGNATURE_INVALID,
            Self::Expired => EXIT_EXPIRED,
            Self::MachineMismatch => EXIT_MACHINE_MISMATCH,
            Self::Environment => EXIT_ENVIRONMENT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::IntegrityFailed => "integrity_failed",
            Self::SignatureInvalid => "signature_invalid",
            Self::Expired => "expired",
            Self::MachineMismatch => "machine_mismatch",
            Self::Environment => "environment",
        }
    }
}

impl From<VerifyFailure> for DenyReason {
    fn from(failure: VerifyFailure) -> Self {
        match failure {
            VerifyFailure::Malformed => Self::Malformed,
            VerifyFailure::IntegrityFailed => Self::IntegrityFailed,
            VerifyFailure::SignatureInvalid => Self::SignatureInvalid,
            VerifyFailure::Expired => Self::Expired,
            VerifyFailure::MachineMismatch => Self::MachineMismatch,
            VerifyFailure::FingerprintUnavailable => Self::Environment,
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a gate run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "UPPERCASE")]
pub enum Decision {
    Allow {
        /// Verified license, when a license gate ran.
        payload: Option<LicensePayload>,
    },
    Deny {
        gate: &'static str,
        reason: DenyReason,
        detail: String,
    },
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allow { .. } => None,
            Self::Deny { reason, .. } => Some(*reason),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Allow { .. } => EXIT_ALLOW,
            Self::Deny { reason, .. } => reason.exit_code(),
        }
    }
}
