//! Error types for the licensing crate.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`LicenseError`].
///
/// Operators use this to tell infrastructure problems apart from security
/// failures: an `Environment` error never means the bundle was tampered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad issuance input, rejected before any cryptographic work.
    Validation,
    /// Key load, signing or verification failure.
    Crypto,
    /// Digest mismatch.
    Integrity,
    /// Missing system information, unreadable files, no entropy.
    Environment,
}

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Issuance request rejected.
    #[error("invalid license payload: {0}")]
    InvalidPayload(String),

    /// License artifact could not be parsed.
    #[error("malformed license artifact: {0}")]
    Malformed(String),

    /// The system RNG could not be read.
    #[error("system entropy unavailable: {0}")]
    EntropyUnavailable(String),

    /// The passphrase did not open the private key envelope.
    #[error("wrong passphrase for private key")]
    WrongPassphrase,

    /// The stored private key is unreadable or inconsistent.
    #[error("corrupt private key: {0}")]
    CorruptKey(String),

    /// Public key material could not be decoded.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Signing could not be completed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Recomputed artifact digest does not match the stored one.
    #[error("integrity check failed")]
    IntegrityFailed,

    /// No machine fingerprint component could be read.
    #[error("machine fingerprint unavailable")]
    FingerprintUnavailable,

    /// Activation refused.
    #[error("activation failed: {0}")]
    ActivationFailed(String),

    /// File access failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LicenseError {
    /// Classifies this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPayload(_)
            | Self::Malformed(_)
            | Self::ActivationFailed(_)
            | Self::Serialization(_) => ErrorKind::Validation,
            Self::WrongPassphrase
            | Self::CorruptKey(_)
            | Self::InvalidPublicKey(_)
            | Self::SigningFailed(_) => ErrorKind::Crypto,
            Self::IntegrityFailed => ErrorKind::Integrity,
            Self::EntropyUnavailable(_) | Self::FingerprintUnavailable | Self::Io { .. } => {
                ErrorKind::Environment
            }
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
