//! Vendor key pair generation and storage.
//!
//! The private key is stored as a small JSON envelope. With a passphrase,
//! the 32-byte Ed25519 seed is sealed with ChaCha20-Poly1305 under an
//! Argon2id key; the salt, KDF parameters and nonce are stored next to the
//! ciphertext, and the public key is bound in as associated data. Public
//! keys are always stored unencrypted, as PEM (SPKI).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePublicKey, EncodePublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use shiplock_crypto::{decrypt, derive_key, encrypt, EncryptedData, KdfParams, Salt};
use subtle::ConstantTimeEq;
use tracing::{debug, info};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{LicenseError, LicenseResult};

/// File name for the sealed private key written by [`KeyManager::write_key_files`].
pub const PRIVATE_KEY_FILE: &str = "shiplock_private.key";

/// File name for the PEM public key written by [`KeyManager::write_key_files`].
pub const PUBLIC_KEY_FILE: &str = "shiplock_public.key";

const ENVELOPE_FORMAT: &str = "shiplock-private-key";
const ENVELOPE_VERSION: u32 = 1;

/// Signature algorithm of a vendor key pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum KeyAlgorithm {
    /// Ed25519 (128-bit security level, 64-byte signatures).
    #[default]
    Ed25519,
}

/// A passphrase held in memory that is wiped when dropped.
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    /// Returns the passphrase text.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Self(Zeroizing::new(value))
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self(Zeroizing::new(value.to_string()))
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Passphrase([REDACTED])")
    }
}

/// Vendor public key. Safe to embed, log and ship.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Creates a public key from its raw 32 bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> LicenseResult<Self> {
        VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|e| LicenseError::InvalidPublicKey(e.to_string()))
    }

    /// Returns the raw 32 bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Encodes as a PEM `PUBLIC KEY` block.
    pub fn to_pem(&self) -> LicenseResult<String> {
        self.0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| LicenseError::InvalidPublicKey(e.to_string()))
    }

    /// Decodes a PEM `PUBLIC KEY` block.
    pub fn from_pem(pem: &str) -> LicenseResult<Self> {
        VerifyingKey::from_public_key_pem(pem.trim())
            .map(Self)
            .map_err(|e| LicenseError::InvalidPublicKey(e.to_string()))
    }

    /// Reads a PEM public key file.
    pub fn read_pem_file(path: &Path) -> LicenseResult<Self> {
        let pem = fs::read_to_string(path).map_err(|e| LicenseError::io(path, e))?;
        Self::from_pem(&pem)
    }

    /// Strict Ed25519 verification of `signature` over `message`.
    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        self.0.verify_strict(message, &signature).is_ok()
    }

    /// Constant-time equality on the encoded key bytes.
    #[must_use]
    pub fn ct_matches(&self, other: &PublicKey) -> bool {
        bool::from(self.to_bytes().ct_eq(&other.to_bytes()))
    }

    /// Short hex identifier for log lines.
    #[must_use]
    pub fn key_id(&self) -> String {
        hex::encode(&self.to_bytes()[..8])
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PublicKey").field(&self.key_id()).finish()
    }
}

/// A vendor signing key pair. The secret half is wiped on drop.
pub struct KeyPair {
    signing: SigningKey,
    public: PublicKey,
}

impl KeyPair {
    fn from_signing_key(signing: SigningKey) -> Self {
        let public = PublicKey(signing.verifying_key());
        Self { signing, public }
    }

    /// Returns the public half.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Returns the algorithm of this key pair.
    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::Ed25519
    }

    /// Signs `message`. Ed25519 signing is deterministic and takes `&self`,
    /// so one key pair may sign from several threads at once.
    pub fn sign(&self, message: &[u8]) -> LicenseResult<[u8; 64]> {
        self.signing
            .try_sign(message)
            .map(|sig| sig.to_bytes())
            .map_err(|e| LicenseError::SigningFailed(e.to_string()))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct KeyEnvelope {
    format: String,
    version: u32,
    algorithm: KeyAlgorithm,
    /// Hex-encoded public key, also the AEAD associated data.
    public_key: String,
    protection: Protection,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum Protection {
    /// Seed stored in the clear (base64).
    None { secret: String },
    /// Seed sealed under an Argon2id-derived key.
    #[serde(rename = "argon2id-chacha20poly1305")]
    Sealed {
        kdf: KdfParams,
        salt: String,
        sealed: String,
    },
}

impl Drop for Protection {
    fn drop(&mut self) {
        if let Self::None { secret } = self {
            secret.zeroize();
        }
    }
}

/// Generates, seals and opens vendor key pairs.
#[derive(Debug, Clone, Default)]
pub struct KeyManager {
    kdf: KdfParams,
}

impl KeyManager {
    /// Creates a key manager with default Argon2id parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the Argon2id parameters used when sealing new keys.
    /// Opening always uses the parameters recorded in the envelope.
    #[must_use]
    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Generates a fresh key pair from the OS RNG.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::EntropyUnavailable`] if the RNG cannot be read.
    pub fn generate_key_pair(&self, algorithm: KeyAlgorithm) -> LicenseResult<KeyPair> {
        match algorithm {
            KeyAlgorithm::Ed25519 => {
                let mut seed = Zeroizing::new([0u8; SECRET_KEY_LENGTH]);
                rand::rngs::OsRng
                    .try_fill_bytes(&mut seed[..])
                    .map_err(|e| LicenseError::EntropyUnavailable(e.to_string()))?;
                let pair = KeyPair::from_signing_key(SigningKey::from_bytes(&seed));
                info!(key_id = %pair.public.key_id(), "generated vendor key pair");
                Ok(pair)
            }
        }
    }

    /// Serializes the private key, sealed under `passphrase` when one is given.
    pub fn persist_private_key(
        &self,
        key: &KeyPair,
        passphrase: Option<&Passphrase>,
    ) -> LicenseResult<Vec<u8>> {
        let public_bytes = key.public.to_bytes();
        let seed = Zeroizing::new(key.signing.to_bytes());

        let protection = match passphrase {
            None => Protection::None {
                secret: BASE64.encode(&seed[..]),
            },
            Some(passphrase) => {
                let salt = Salt::random()
                    .map_err(|e| LicenseError::EntropyUnavailable(e.to_string()))?;
                let envelope_key = derive_key(passphrase.expose(), &salt, &self.kdf)
                    .map_err(|e| LicenseError::CorruptKey(e.to_string()))?;
                let sealed = encrypt(&envelope_key, &seed[..], &public_bytes)
                    .map_err(|e| LicenseError::CorruptKey(e.to_string()))?;
                Protection::Sealed {
                    kdf: self.kdf.clone(),
                    salt: BASE64.encode(salt.as_bytes()),
                    sealed: sealed.to_base64(),
                }
            }
        };

        let envelope = KeyEnvelope {
            format: ENVELOPE_FORMAT.to_string(),
            version: ENVELOPE_VERSION,
            algorithm: key.algorithm(),
            public_key: hex::encode(public_bytes),
            protection,
        };
        Ok(serde_json::to_vec_pretty(&envelope)?)
    }

    /// Opens a private key written by [`persist_private_key`](Self::persist_private_key).
    ///
    /// # Errors
    ///
    /// [`LicenseError::WrongPassphrase`] if the envelope is sealed and the
    /// passphrase is missing or does not open it; [`LicenseError::CorruptKey`]
    /// if the envelope cannot be parsed or its halves disagree.
    pub fn load_private_key(
        &self,
        bytes: &[u8],
        passphrase: Option<&Passphrase>,
    ) -> LicenseResult<KeyPair> {
        let envelope: KeyEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| LicenseError::CorruptKey(format!("unreadable key envelope: {e}")))?;
        if envelope.format != ENVELOPE_FORMAT || envelope.version != ENVELOPE_VERSION {
            return Err(LicenseError::CorruptKey(format!(
                "unsupported key envelope {} v{}",
                envelope.format, envelope.version
            )));
        }
        let public_bytes: [u8; 32] = hex::decode(&envelope.public_key)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| LicenseError::CorruptKey("bad public key encoding".into()))?;

        let seed: Zeroizing<Vec<u8>> = match &envelope.protection {
            Protection::None { secret } => Zeroizing::new(
                BASE64
                    .decode(secret)
                    .map_err(|e| LicenseError::CorruptKey(e.to_string()))?,
            ),
            Protection::Sealed { kdf, salt, sealed } => {
                let passphrase = passphrase.ok_or(LicenseError::WrongPassphrase)?;
                let salt = BASE64
                    .decode(salt)
                    .ok()
                    .and_then(|s| Salt::from_slice(&s).ok())
                    .ok_or_else(|| LicenseError::CorruptKey("bad salt".into()))?;
                let sealed = EncryptedData::from_base64(sealed)
                    .map_err(|e| LicenseError::CorruptKey(e.to_string()))?;
                let envelope_key = derive_key(passphrase.expose(), &salt, kdf)
                    .map_err(|e| LicenseError::CorruptKey(e.to_string()))?;
                Zeroizing::new(
                    decrypt(&envelope_key, &sealed, &public_bytes)
                        .map_err(|_| LicenseError::WrongPassphrase)?,
                )
            }
        };

        let seed: Zeroizing<[u8; SECRET_KEY_LENGTH]> = Zeroizing::new(
            seed.as_slice()
                .try_into()
                .map_err(|_| LicenseError::CorruptKey("bad secret key length".into()))?,
        );
        let pair = KeyPair::from_signing_key(SigningKey::from_bytes(&seed));
        if !bool::from(pair.public.to_bytes().ct_eq(&public_bytes)) {
            return Err(LicenseError::CorruptKey(
                "secret key does not match stored public key".into(),
            ));
        }
        debug!(key_id = %pair.public.key_id(), "loaded vendor private key");
        Ok(pair)
    }

    /// Writes `shiplock_private.key` and `shiplock_public.key` into `dir`.
    pub fn write_key_files(
        &self,
        dir: &Path,
        key: &KeyPair,
        passphrase: Option<&Passphrase>,
    ) -> LicenseResult<(PathBuf, PathBuf)> {
        let private_path = dir.join(PRIVATE_KEY_FILE);
        let public_path = dir.join(PUBLIC_KEY_FILE);

        let private_bytes = Zeroizing::new(self.persist_private_key(key, passphrase)?);
        write_private_file(&private_path, &private_bytes)?;
        write_file(&public_path, key.public.to_pem()?.as_bytes())?;

        info!(path = %private_path.display(), "wrote vendor key files");
        Ok((private_path, public_path))
    }

    /// Reads and opens a private key file.
    pub fn read_private_key_file(
        &self,
        path: &Path,
        passphrase: Option<&Passphrase>,
    ) -> LicenseResult<KeyPair> {
        let bytes = Zeroizing::new(fs::read(path).map_err(|e| LicenseError::io(path, e))?);
        self.load_private_key(&bytes, passphrase)
    }
}

/// Creates (or truncates) `path`, writes `bytes`, and syncs before returning.
/// The handle is closed on every path out of this function.
pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> LicenseResult<()> {
    let file = fs::File::create(path).map_err(|e| LicenseError::io(path, e))?;
    write_synced(file, path, bytes)
}

/// Like [`write_file`], but the file is readable by its owner only (unix).
fn write_private_file(path: &Path, bytes: &[u8]) -> LicenseResult<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let file = options.open(path).map_err(|e| LicenseError::io(path, e))?;
        // `mode` only applies on creation; tighten a pre-existing file too.
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| LicenseError::io(path, e))?;
        write_synced(file, path, bytes)
    }
    #[cfg(not(unix))]
    {
        let file = options.open(path).map_err(|e| LicenseError::io(path, e))?;
        write_synced(file, path, bytes)
    }
}

fn write_synced(mut file: fs::File, path: &Path, bytes: &[u8]) -> LicenseResult<()> {
    file.write_all(bytes).map_err(|e| LicenseError::io(path, e))?;
    file.sync_all().map_err(|e| LicenseError::io(path, e))
}
