//! Error types for the manifest crate.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported manifest version {0}")]
    UnsupportedVersion(u32),

    #[error("unsupported digest algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    #[error("bundle root is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("digest worker panicked")]
    WorkerPanicked,
}

impl ManifestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type ManifestResult<T> = Result<T, ManifestError>;
