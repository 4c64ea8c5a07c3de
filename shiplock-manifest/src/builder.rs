//! Manifest construction from a bundle directory.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::digest::file_digest;
use crate::error::{ManifestError, ManifestResult};
use crate::manifest::{Manifest, MANIFEST_FILE};
use crate::pool::{map_bounded, PoolConfig};

type Predicate<'a> = Box<dyn Fn(&str) -> bool + 'a>;

/// Fluent builder for a [`Manifest`].
///
/// Walks `root` recursively, keeping regular files whose `/`-separated
/// relative path passes the predicate. Symlinks and special files are
/// skipped. `MANIFEST.json` at the root is always excluded.
pub struct ManifestBuilder<'a> {
    root: PathBuf,
    predicate: Predicate<'a>,
    excluded: BTreeSet<String>,
    pool: PoolConfig,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            predicate: Box::new(|_| true),
            excluded: BTreeSet::from([MANIFEST_FILE.to_string()]),
            pool: PoolConfig::default(),
        }
    }

    /// Keeps only files for which `predicate(relative_path)` is true.
    pub fn filter(mut self, predicate: impl Fn(&str) -> bool + 'a) -> Self {
        self.predicate = Box::new(predicate);
        self
    }

    /// Excludes one relative path.
    pub fn exclude(mut self, relative_path: impl Into<String>) -> Self {
        self.excluded.insert(relative_path.into());
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.pool = PoolConfig::with_workers(workers);
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Relative paths that would be listed, sorted.
    pub fn collect_paths(&self) -> ManifestResult<Vec<String>> {
        let meta = fs::metadata(&self.root).map_err(|e| ManifestError::io(&self.root, e))?;
        if !meta.is_dir() {
            return Err(ManifestError::NotADirectory(self.root.clone()));
        }
        let mut out = Vec::new();
        self.walk(&self.root, "", &mut out)?;
        Ok(out)
    }

    pub fn build(&self) -> ManifestResult<Manifest> {
        let paths = self.collect_paths()?;
        let root = self.root.as_path();
        let digests = map_bounded(&paths, self.pool, |rel| file_digest(&root.join(rel)))?;

        let mut files = BTreeMap::new();
        for (rel, digest) in paths.into_iter().zip(digests) {
            files.insert(rel, digest?);
        }

        info!(
            root = %self.root.display(),
            files = files.len(),
            workers = self.pool.workers,
            "built bundle manifest"
        );
        Ok(Manifest::new(files))
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) -> ManifestResult<()> {
        let mut entries = fs::read_dir(dir)
            .map_err(|e| ManifestError::io(dir, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ManifestError::io(dir, e))?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let name = entry
                .file_name()
                .into_string()
                .map_err(|_| ManifestError::NonUtf8Path(path.clone()))?;
            if name.contains('\\') {
                warn!(path = %path.display(), "skipping file name with a backslash");
                continue;
            }
            let rel = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };

            // file_type() does not follow symlinks.
            let file_type = entry.file_type().map_err(|e| ManifestError::io(&path, e))?;
            if file_type.is_dir() {
                self.walk(&path, &rel, out)?;
            } else if file_type.is_file() {
                if self.excluded.contains(&rel) || !(self.predicate)(&rel) {
                    continue;
                }
                out.push(rel);
            } else {
                debug!(path = %path.display(), "skipping non-regular file");
            }
        }
        Ok(())
    }
}

/// Builds a manifest of every regular file under `root` accepted by `predicate`.
pub fn build_manifest(
    root: &Path,
    predicate: impl Fn(&str) -> bool,
) -> ManifestResult<Manifest> {
    ManifestBuilder::new(root).filter(predicate).build()
}
