//! Client-side license verification.
//!
//! Verification is an ordered list of named steps over shared pipeline
//! state. The first failing step ends the run and its reason is the result;
//! later steps never run to "recover" an earlier failure. A new check is
//! added by appending to [`STEPS`].

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifact::SignedArtifact;
use crate::clock::{Clock, SystemClock};
use crate::fingerprint::{FingerprintProvider, SystemFingerprint};
use crate::integrity::{digests_match, integrity_digest};
use crate::keys::PublicKey;
use crate::payload::LicensePayload;

/// Why a license was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyFailure {
    /// The artifact or payload structure could not be parsed.
    Malformed,
    /// The integrity digest does not match.
    IntegrityFailed,
    /// The signature does not verify, or the signer is not the trusted key.
    SignatureInvalid,
    /// The license is past its expiry.
    Expired,
    /// The license is bound to a different machine.
    MachineMismatch,
    /// The local fingerprint could not be computed.
    FingerprintUnavailable,
}

impl VerifyFailure {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::IntegrityFailed => "integrity_failed",
            Self::SignatureInvalid => "signature_invalid",
            Self::Expired => "expired",
            Self::MachineMismatch => "machine_mismatch",
            Self::FingerprintUnavailable => "fingerprint_unavailable",
        }
    }

    /// True for failures caused by the host rather than the artifact.
    /// These must not be reported to operators as tampering.
    #[must_use]
    pub fn is_environmental(&self) -> bool {
        matches!(self, Self::FingerprintUnavailable)
    }
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`LicenseVerifier::verify`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Verification {
    /// Every step passed.
    Valid { payload: LicensePayload },
    /// One step failed.
    Invalid {
        reason: VerifyFailure,
        step: &'static str,
        detail: String,
    },
}

impl Verification {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    #[must_use]
    pub fn reason(&self) -> Option<VerifyFailure> {
        match self {
            Self::Valid { .. } => None,
            Self::Invalid { reason, .. } => Some(*reason),
        }
    }

    /// The decoded payload of a valid license.
    #[must_use]
    pub fn payload(&self) -> Option<&LicensePayload> {
        match self {
            Self::Valid { payload } => Some(payload),
            Self::Invalid { .. } => None,
        }
    }

    #[must_use]
    pub fn into_payload(self) -> Option<LicensePayload> {
        match self {
            Self::Valid { payload } => Some(payload),
            Self::Invalid { .. } => None,
        }
    }
}

type StepResult = Result<(), (VerifyFailure, String)>;
type Step = fn(&LicenseVerifier, &mut Pipeline<'_>) -> StepResult;

/// Verification steps, in order.
const STEPS: &[(&str, Step)] = &[
    ("parse", parse),
    ("integrity", check_integrity),
    ("signature", check_signature),
    ("expiry", check_expiry),
    ("machine", check_machine),
];

struct Pipeline<'a> {
    bytes: &'a [u8],
    trusted_key: Option<&'a PublicKey>,
    artifact: Option<SignedArtifact>,
    payload_bytes: Option<Vec<u8>>,
    payload: Option<LicensePayload>,
}

impl Pipeline<'_> {
    fn artifact(&self) -> Result<&SignedArtifact, (VerifyFailure, String)> {
        self.artifact
            .as_ref()
            .ok_or((VerifyFailure::Malformed, "artifact not parsed".into()))
    }
}

/// Verifies license artifacts.
///
/// Stateless across calls; one verifier can be shared between threads.
#[derive(Clone)]
pub struct LicenseVerifier {
    fingerprint: Arc<dyn FingerprintProvider>,
    clock: Arc<dyn Clock>,
    require_trusted_key: bool,
}

impl Default for LicenseVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LicenseVerifier {
    /// A verifier using the local machine fingerprint and system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fingerprint: Arc::new(SystemFingerprint),
            clock: Arc::new(SystemClock),
            require_trusted_key: false,
        }
    }

    #[must_use]
    pub fn with_fingerprint_provider(mut self, provider: impl FingerprintProvider + 'static) -> Self {
        self.fingerprint = Arc::new(provider);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Rejects artifacts when no trusted key is supplied. Without a pinned
    /// key an artifact only proves it was signed by the key it carries.
    #[must_use]
    pub fn require_trusted_key(mut self, required: bool) -> Self {
        self.require_trusted_key = required;
        self
    }

    /// Runs every step against `artifact_bytes`. Never panics or errors; the
    /// result always carries either the payload or exactly one reason.
    pub fn verify(&self, artifact_bytes: &[u8], trusted_key: Option<&PublicKey>) -> Verification {
        let mut pipeline = Pipeline {
            bytes: artifact_bytes,
            trusted_key,
            artifact: None,
            payload_bytes: None,
            payload: None,
        };

        for &(name, step) in STEPS {
            if let Err((reason, detail)) = step(self, &mut pipeline) {
                warn!(step = name, reason = %reason, %detail, "license rejected");
                return Verification::Invalid {
                    reason,
                    step: name,
                    detail,
                };
            }
            debug!(step = name, "license check passed");
        }

        match pipeline.payload {
            Some(payload) => {
                info!(
                    license_id = %payload.license_id,
                    product_id = %payload.product_id,
                    "license valid"
                );
                Verification::Valid { payload }
            }
            None => Verification::Invalid {
                reason: VerifyFailure::Malformed,
                step: "decode",
                detail: "payload not decoded".into(),
            },
        }
    }
}

fn parse(_: &LicenseVerifier, p: &mut Pipeline<'_>) -> StepResult {
    let artifact = SignedArtifact::from_slice(p.bytes)
        .map_err(|e| (VerifyFailure::Malformed, e.to_string()))?;
    p.artifact = Some(artifact);
    Ok(())
}

fn check_integrity(_: &LicenseVerifier, p: &mut Pipeline<'_>) -> StepResult {
    let artifact = p.artifact()?;
    let expected = integrity_digest(&artifact.license, &artifact.signature);
    if !digests_match(&expected, artifact.integrity.trim()) {
        return Err((
            VerifyFailure::IntegrityFailed,
            "integrity digest mismatch, license may be tampered".into(),
        ));
    }
    Ok(())
}

fn check_signature(v: &LicenseVerifier, p: &mut Pipeline<'_>) -> StepResult {
    let invalid = |detail: String| (VerifyFailure::SignatureInvalid, detail);
    let artifact = p.artifact()?;

    let embedded = artifact
        .embedded_public_key()
        .map_err(|e| invalid(e.to_string()))?;
    let key = match p.trusted_key {
        Some(trusted) if !trusted.ct_matches(&embedded) => {
            return Err(invalid(format!(
                "signer {} is not the trusted key {}",
                embedded.key_id(),
                trusted.key_id()
            )));
        }
        Some(trusted) => *trusted,
        None if v.require_trusted_key => {
            return Err(invalid("no trusted public key pinned".into()));
        }
        None => embedded,
    };

    let payload_bytes = BASE64
        .decode(artifact.license.trim())
        .map_err(|e| invalid(format!("license field: {e}")))?;
    let signature = BASE64
        .decode(artifact.signature.trim())
        .map_err(|e| invalid(format!("signature field: {e}")))?;

    if !key.verify(&payload_bytes, &signature) {
        return Err(invalid("signature verification failed".into()));
    }
    p.payload_bytes = Some(payload_bytes);
    Ok(())
}

fn check_expiry(v: &LicenseVerifier, p: &mut Pipeline<'_>) -> StepResult {
    let bytes = p
        .payload_bytes
        .as_deref()
        .ok_or((VerifyFailure::Malformed, "payload not decoded".to_string()))?;
    let payload = LicensePayload::from_canonical_bytes(bytes)
        .map_err(|e| (VerifyFailure::Malformed, e.to_string()))?;
    payload
        .validate()
        .map_err(|e| (VerifyFailure::Malformed, e.to_string()))?;

    let now = v.clock.now();
    if payload.expires_at.is_past(now) {
        return Err((
            VerifyFailure::Expired,
            format!("license expired at {}", payload.expires_at),
        ));
    }
    p.payload = Some(payload);
    Ok(())
}

fn check_machine(v: &LicenseVerifier, p: &mut Pipeline<'_>) -> StepResult {
    let payload = p
        .payload
        .as_ref()
        .ok_or((VerifyFailure::Malformed, "payload not decoded".to_string()))?;
    if !payload.machine_bound {
        return Ok(());
    }
    let expected = payload
        .machine_id
        .as_deref()
        .ok_or((VerifyFailure::Malformed, "machine-bound license has no machine_id".to_string()))?;

    let local = v
        .fingerprint
        .compute()
        .map_err(|e| (VerifyFailure::FingerprintUnavailable, e.to_string()))?;
    if !local.matches(expected) {
        return Err((
            VerifyFailure::MachineMismatch,
            format!(
                "license bound to {}..., this machine is {}...",
                expected.get(..16).unwrap_or(expected),
                local.short()
            ),
        ));
    }
    Ok(())
}
