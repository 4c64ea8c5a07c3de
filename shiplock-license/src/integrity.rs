//! Artifact integrity digest.
//!
//! `sha256(sha512(sha256(payload_b64 ":" signature_b64 ‖ salt) ‖ salt) ‖ salt)`,
//! each intermediate hex-encoded before the next round.
//!
//! The salt ships inside every verifier, so this digest only makes naive
//! precomputation more expensive. It is an obfuscation layer and a cheap
//! early reject for corrupted files; anyone who can read this module can
//! recompute it for a forged artifact. Authenticity comes from the
//! signature check alone.

use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

/// Fixed, public salt mixed into every round.
pub const INTEGRITY_SALT: &[u8] = b"shiplock_integrity_salt_v1";

/// Computes the integrity digest over the two encoded artifact fields.
#[must_use]
pub fn integrity_digest(payload_b64: &str, signature_b64: &str) -> String {
    let combined = format!("{payload_b64}:{signature_b64}");
    let round1 = salted_hex::<Sha256>(combined.as_bytes());
    let round2 = salted_hex::<Sha512>(round1.as_bytes());
    salted_hex::<Sha256>(round2.as_bytes())
}

/// Constant-time comparison of two hex digests.
#[must_use]
pub fn digests_match(expected: &str, actual: &str) -> bool {
    bool::from(expected.as_bytes().ct_eq(actual.as_bytes()))
}

fn salted_hex<D: Digest>(input: &[u8]) -> String {
    let mut hasher = D::new();
    hasher.update(input);
    hasher.update(INTEGRITY_SALT);
    hex::encode(hasher.finalize())
}
