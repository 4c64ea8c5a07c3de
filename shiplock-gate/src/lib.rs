//! Runtime gate for ShipLock bundles.
//!
//! Before the protected workload starts, the launcher runs a [`RuntimeGate`]:
//! the bundle is checked against its manifest, then the license is verified.
//! The first failing gate denies, and the [`Decision`] maps to a process exit
//! code the launcher can act on:
//!
//! | code | meaning |
//! |---|---|
//! | 0 | ALLOW |
//! | 1 | usage or configuration error |
//! | 2 | malformed license |
//! | 3 | integrity failed (bundle or license) |
//! | 4 | signature invalid or untrusted signer |
//! | 5 | license expired |
//! | 6 | machine mismatch |
//! | 7 | environment (unreadable file, no fingerprint) |

mod config;
mod decision;
mod error;
mod gate;
mod gates;
mod runtime;

pub use config::{GateConfig, CONFIG_FILE};
pub use decision::{
    Decision, DenyReason, EXIT_ALLOW, EXIT_ENVIRONMENT, EXIT_EXPIRED, EXIT_INTEGRITY_FAILED,
    EXIT_MACHINE_MISMATCH, EXIT_MALFORMED, EXIT_SIGNATURE_INVALID, EXIT_USAGE,
};
pub use error::{GateError, GateResult};
pub use gate::{Evaluation, Gate, GateContext, GateOutcome, GateRunner, GateState};
pub use gates::{LicenseGate, ManifestGate};
pub use runtime::RuntimeGate;
