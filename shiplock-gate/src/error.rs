//! Error types for the gate crate.

use std::path::PathBuf;

use shiplock_license::LicenseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid gate config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid gate config: {0}")]
    Config(String),

    #[error(transparent)]
    License(#[from] LicenseError),
}

pub type GateResult<T> = Result<T, GateError>;
