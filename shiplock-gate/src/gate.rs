//! Named gates run in order until one fails.

use std::fmt;

use serde::Serialize;
use shiplock_license::LicensePayload;
use tracing::{debug, info, warn};

use crate::decision::{Decision, DenyReason};

/// Gate state machine positions.
///
/// `INIT -> MANIFEST_CHECK -> LICENSE_CHECK -> ALLOW`, with any check able
/// to move to `DENY`. `ALLOW` and `DENY` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateState {
    Init,
    ManifestCheck,
    LicenseCheck,
    Allow,
    Deny,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "INIT",
            Self::ManifestCheck => "MANIFEST_CHECK",
            Self::LicenseCheck => "LICENSE_CHECK",
            Self::Allow => "ALLOW",
            Self::Deny => "DENY",
        })
    }
}

/// Result of one gate.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    Pass,
    Fail { reason: DenyReason, detail: String },
}

impl GateOutcome {
    pub fn fail(reason: DenyReason, detail: impl Into<String>) -> Self {
        Self::Fail {
            reason,
            detail: detail.into(),
        }
    }
}

/// Data handed from earlier gates to later ones.
#[derive(Debug, Default)]
pub struct GateContext {
    pub payload: Option<LicensePayload>,
}

/// A single check in a [`GateRunner`].
pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;

    /// State the machine is in while this gate runs.
    fn state(&self) -> GateState;

    fn check(&self, ctx: &mut GateContext) -> GateOutcome;
}

/// A decision plus the states visited on the way to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub decision: Decision,
    pub states: Vec<GateState>,
}

/// Runs gates in order; the first failure is terminal.
#[derive(Default)]
pub struct GateRunner {
    gates: Vec<Box<dyn Gate>>,
}

impl GateRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gate(mut self, gate: impl Gate + 'static) -> Self {
        self.gates.push(Box::new(gate));
        self
    }

    pub fn gate_names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    pub fn run(&self) -> Evaluation {
        let mut ctx = GateContext::default();
        let mut states = vec![GateState::Init];

        for gate in &self.gates {
            states.push(gate.state());
            debug!(gate = gate.name(), state = %gate.state(), "running gate");
            if let GateOutcome::Fail { reason, detail } = gate.check(&mut ctx) {
                warn!(gate = gate.name(), %reason, %detail, "gate denied");
                states.push(GateState::Deny);
                return Evaluation {
                    decision: Decision::Deny {
                        gate: gate.name(),
                        reason,
                        detail,
                    },
                    states,
                };
            }
        }

        states.push(GateState::Allow);
        info!(gates = self.gates.len(), "all gates passed");
        Evaluation {
            decision: Decision::Allow {
                payload: ctx.payload,
            },
            states,
        }
    }
}
