//! The runtime gate: manifest check, then license check.

use std::sync::Arc;

use shiplock_license::{
    activate, ActivationStore, Clock, LicenseVerifier, PublicKey, SystemClock, Verification,
};
use shiplock_manifest::PoolConfig;
use tracing::{info, warn};

use crate::config::GateConfig;
use crate::decision::Decision;
use crate::error::GateResult;
use crate::gate::{Evaluation, GateRunner};
use crate::gates::{LicenseGate, ManifestGate};

/// Decides whether the protected workload may start.
///
/// The workload starts only on [`Decision::Allow`]; there is no partial
/// start. A successful run may optionally record a local activation.
pub struct RuntimeGate {
    runner: GateRunner,
    activation: Option<ActivationStore>,
    clock: Arc<dyn Clock>,
}

impl RuntimeGate {
    pub fn new(manifest: ManifestGate, license: LicenseGate) -> Self {
        Self {
            runner: GateRunner::new().with_gate(manifest).with_gate(license),
            activation: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Builds the gate described by `config` with a default verifier.
    pub fn from_config(config: &GateConfig) -> GateResult<Self> {
        Self::from_config_with(config, LicenseVerifier::new())
    }

    /// Builds the gate described by `config` around `verifier`.
    pub fn from_config_with(config: &GateConfig, verifier: LicenseVerifier) -> GateResult<Self> {
        config.validate()?;

        let mut manifest = ManifestGate::new(&config.bundle_root, config.manifest_path());
        if let Some(workers) = config.manifest_workers {
            manifest = manifest.with_pool(PoolConfig::with_workers(workers));
        }

        let verifier = verifier.require_trusted_key(config.require_trusted_key);
        let mut license = LicenseGate::new(&config.license_path, verifier);
        if let Some(path) = &config.trusted_public_key {
            license = license.with_trusted_key(PublicKey::read_pem_file(path)?);
        }

        let mut gate = Self::new(manifest, license);
        if config.record_activation {
            let store = match &config.activation_path {
                Some(path) => ActivationStore::new(path),
                None => ActivationStore::open_default()?,
            };
            gate = gate.with_activation(store);
        }
        Ok(gate)
    }

    pub fn with_activation(mut self, store: ActivationStore) -> Self {
        self.activation = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn evaluate(&self) -> Evaluation {
        let evaluation = self.runner.run();

        match &evaluation.decision {
            Decision::Allow { payload } => {
                if let (Some(store), Some(payload)) = (&self.activation, payload) {
                    let verified = Verification::Valid {
                        payload: payload.clone(),
                    };
                    if let Err(e) = activate(store, &verified, self.clock.as_ref()) {
                        warn!(error = %e, "could not record activation");
                    }
                }
                info!("runtime gate: ALLOW");
            }
            Decision::Deny { gate, reason, .. } => {
                warn!(gate, %reason, exit_code = reason.exit_code(), "runtime gate: DENY");
            }
        }
        evaluation
    }

    pub fn decide(&self) -> Decision {
        self.evaluate().decision
    }
}
