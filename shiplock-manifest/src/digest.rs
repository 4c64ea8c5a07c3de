//! Per-file content digests.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{ManifestError, ManifestResult};

const READ_BUFFER: usize = 64 * 1024;

/// Streams `path` through SHA-256 and returns the lowercase hex digest.
pub fn file_digest(path: &Path) -> ManifestResult<String> {
    let mut file = File::open(path).map_err(|e| ManifestError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ManifestError::io(path, e)),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
