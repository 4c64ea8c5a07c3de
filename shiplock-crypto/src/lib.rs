//! Passphrase-based key protection for ShipLock.
//!
//! The vendor signing key is stored at rest inside a symmetric envelope:
//! an Argon2id key is derived from the operator's passphrase with a random
//! salt, and the secret is sealed with ChaCha20-Poly1305. Salt, KDF
//! parameters and nonce travel alongside the ciphertext; none of them are
//! secret.

mod cipher;
mod error;
mod key;

pub use cipher::{decrypt, encrypt, EncryptedData, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, generate_random_key, DerivedKey, KdfParams, Salt, KEY_SIZE, SALT_SIZE};
