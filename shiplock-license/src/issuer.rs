//! Vendor-side license creation and signing.

use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::artifact::SignedArtifact;
use crate::clock::{Clock, SystemClock};
use crate::error::{LicenseError, LicenseResult};
use crate::fingerprint::{FingerprintProvider, MachineFingerprint, SystemFingerprint};
use crate::integrity::integrity_digest;
use crate::keys::KeyPair;
use crate::payload::{Expiry, Features, LicensePayload};

/// Parameters for one license.
#[derive(Debug, Clone)]
pub struct LicenseRequest {
    product_id: String,
    client: String,
    expires_at: Expiry,
    machine_bound: bool,
    machine_id: Option<MachineFingerprint>,
    features: Features,
}

impl LicenseRequest {
    /// A perpetual, unbound license with no features.
    pub fn new(product_id: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            client: client.into(),
            expires_at: Expiry::Never,
            machine_bound: false,
            machine_id: None,
            features: Features::new(),
        }
    }

    #[must_use]
    pub fn expires(mut self, expires_at: Expiry) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Binds the license to the machine the issuer's fingerprint provider
    /// reports.
    #[must_use]
    pub fn machine_bound(mut self, bound: bool) -> Self {
        self.machine_bound = bound;
        self
    }

    /// Binds the license to a fingerprint collected on the client machine.
    #[must_use]
    pub fn bind_to(mut self, machine_id: MachineFingerprint) -> Self {
        self.machine_bound = true;
        self.machine_id = Some(machine_id);
        self
    }

    #[must_use]
    pub fn feature(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.features.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn features(mut self, features: Features) -> Self {
        self.features.extend(features);
        self
    }
}

/// Builds and signs license payloads.
///
/// Machine binding has a protocol gap: the fingerprint must come from the
/// client machine. Either run the issuer there, or have the client run
/// `shiplock fingerprint` and pass the result to [`LicenseRequest::bind_to`].
#[derive(Clone)]
pub struct LicenseIssuer {
    fingerprint: Arc<dyn FingerprintProvider>,
    clock: Arc<dyn Clock>,
}

impl Default for LicenseIssuer {
    fn default() -> Self {
        Self::new()
    }
}

impl LicenseIssuer {
    /// An issuer that fingerprints the local machine and reads the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fingerprint: Arc::new(SystemFingerprint),
            clock: Arc::new(SystemClock),
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

    /// Builds a payload from a request.
    ///
    /// # Errors
    ///
    /// [`LicenseError::InvalidPayload`] for blank product/client or an expiry
    /// before now; [`LicenseError::FingerprintUnavailable`] if binding to the
    /// local machine and nothing can be read.
    pub fn create(&self, request: LicenseRequest) -> LicenseResult<LicensePayload> {
        if request.product_id.trim().is_empty() {
            return Err(LicenseError::InvalidPayload("product_id is required".into()));
        }
        if request.client.trim().is_empty() {
            return Err(LicenseError::InvalidPayload("client is required".into()));
        }
        let issued_at = self.clock.now();
        if request.expires_at.is_past(issued_at) {
            return Err(LicenseError::InvalidPayload(format!(
                "expires_at {} precedes issuance",
                request.expires_at
            )));
        }

        let machine_id = match (request.machine_bound, request.machine_id) {
            (false, _) => None,
            (true, Some(id)) => Some(id),
            (true, None) => Some(self.fingerprint.compute()?),
        };

        let payload = LicensePayload {
            license_id: Uuid::new_v4(),
            product_id: request.product_id,
            client: request.client,
            issued_at,
            expires_at: request.expires_at,
            machine_bound: request.machine_bound,
            machine_id: machine_id.map(|id| id.as_str().to_string()),
            features: request.features,
        };
        payload.validate()?;
        Ok(payload)
    }

    /// Positional form of [`create`](Self::create).
    pub fn create_license(
        &self,
        product_id: &str,
        client: &str,
        expires_at: Option<Expiry>,
        machine_bound: bool,
        features: Option<Features>,
    ) -> LicenseResult<LicensePayload> {
        let request = LicenseRequest::new(product_id, client)
            .expires(expires_at.unwrap_or(Expiry::Never))
            .machine_bound(machine_bound)
            .features(features.unwrap_or_default());
        self.create(request)
    }

    /// Signs a payload.
    ///
    /// The signature covers the canonical payload bytes, which are also the
    /// bytes carried (base64) in the artifact. The fresh signature is checked
    /// against the key's public half before the artifact is assembled.
    ///
    /// # Errors
    ///
    /// [`LicenseError::InvalidPayload`] if the payload breaks an invariant;
    /// [`LicenseError::SigningFailed`] if the key cannot produce a signature
    /// that verifies under its own public key.
    pub fn sign(&self, payload: &LicensePayload, key: &KeyPair) -> LicenseResult<SignedArtifact> {
        payload.validate()?;
        let canonical = payload.canonical_bytes()?;
        let signature = key.sign(&canonical)?;

        let public_key = key.public_key();
        if !public_key.verify(&canonical, &signature) {
            return Err(LicenseError::SigningFailed(
                "signature does not verify under the key pair's public key".into(),
            ));
        }

        let license = BASE64.encode(&canonical);
        let signature = BASE64.encode(signature);
        let integrity = integrity_digest(&license, &signature);

        info!(
            license_id = %payload.license_id,
            product_id = %payload.product_id,
            machine_bound = payload.machine_bound,
            key_id = %public_key.key_id(),
            "signed license"
        );

        Ok(SignedArtifact {
            license,
            signature,
            public_key: public_key.to_pem()?,
            integrity,
        })
    }

    /// Creates and signs in one step.
    pub fn issue(&self, request: LicenseRequest, key: &KeyPair) -> LicenseResult<SignedArtifact> {
        let payload = self.create(request)?;
        self.sign(&payload, key)
    }

    /// Writes an artifact to disk.
    pub fn write(&self, artifact: &SignedArtifact, path: &Path) -> LicenseResult<()> {
        artifact.write(path)?;
        info!(path = %path.display(), "wrote license artifact");
        Ok(())
    }
}
