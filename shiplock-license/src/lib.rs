//! Offline licensing for ShipLock bundles.
//!
//! This crate handles:
//! - Vendor key generation and passphrase-sealed key storage
//! - License payload canonicalization and Ed25519 signing
//! - Ordered, short-circuiting license verification
//! - Machine fingerprinting for license binding
//! - A local activation record
//!
//! # License Artifact Format
//!
//! A JSON object with four string fields: `license` (base64 canonical
//! payload), `signature` (base64 Ed25519 signature over those bytes),
//! `public_key` (PEM), and `integrity` (hex digest over the first two).
//!
//! # Trust
//!
//! The embedded public key makes every artifact self-certifying: anyone can
//! mint a key and sign a structurally valid license. Verifiers should pin the
//! vendor key (baked into the launcher) and pass it to
//! [`LicenseVerifier::verify`]; the embedded key is then only cross-checked.
//! There is no revocation channel, and expiry is judged against the local
//! clock.

pub mod activation;
pub mod artifact;
pub mod clock;
mod error;
pub mod fingerprint;
pub mod integrity;
pub mod issuer;
pub mod keys;
pub mod payload;
pub mod verifier;

pub use activation::{activate, Activation, ActivationStore};
pub use artifact::SignedArtifact;
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ErrorKind, LicenseError, LicenseResult};
pub use fingerprint::{
    FingerprintComponents, FingerprintProvider, MachineFingerprint, StaticFingerprint,
    SystemFingerprint, SystemInfo,
};
pub use integrity::{digests_match, integrity_digest, INTEGRITY_SALT};
pub use issuer::{LicenseIssuer, LicenseRequest};
pub use keys::{KeyAlgorithm, KeyManager, KeyPair, Passphrase, PublicKey};
pub use payload::{canonical_bytes, Expiry, Features, LicensePayload};
pub use verifier::{LicenseVerifier, Verification, VerifyFailure};
