//! Gate configuration (`shiplock.toml`).
//!
//! ```toml
//! bundle_root = "/opt/app"
//! license_path = "/etc/shiplock/license.key"
//! trusted_public_key = "/etc/shiplock/shiplock_public.key"
//! # manifest_path = "/opt/app/MANIFEST.json"
//! # require_trusted_key = true
//! # record_activation = false
//! # activation_path = "/var/lib/app/activation.json"
//! # manifest_workers = 4
//! ```
//!
//! Relative paths are resolved against the directory holding the config
//! file. A leading `~` is not expanded; it is just a relative path.
//! Unlike most configuration, a missing or malformed gate config is an
//! error: the gate never falls back to permissive defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shiplock_manifest::MANIFEST_FILE;
use tracing::info;

use crate::error::{GateError, GateResult};

/// Conventional config file name.
pub const CONFIG_FILE: &str = "shiplock.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateConfig {
    pub bundle_root: PathBuf,
    /// Defaults to `MANIFEST.json` inside `bundle_root`.
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,
    pub license_path: PathBuf,
    /// PEM file holding the vendor public key.
    #[serde(default)]
    pub trusted_public_key: Option<PathBuf>,
    #[serde(default = "default_require_trusted_key")]
    pub require_trusted_key: bool,
    #[serde(default)]
    pub record_activation: bool,
    /// Defaults to `~/.shiplock/activation.json`.
    #[serde(default)]
    pub activation_path: Option<PathBuf>,
    #[serde(default)]
    pub manifest_workers: Option<usize>,
}

fn default_require_trusted_key() -> bool {
    true
}

impl GateConfig {
    pub fn new(bundle_root: impl Into<PathBuf>, license_path: impl Into<PathBuf>) -> Self {
        Self {
            bundle_root: bundle_root.into(),
            manifest_path: None,
            license_path: license_path.into(),
            trusted_public_key: None,
            require_trusted_key: default_require_trusted_key(),
            record_activation: false,
            activation_path: None,
            manifest_workers: None,
        }
    }

    /// Loads and validates a config file.
    pub fn load_from(path: &Path) -> GateResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| GateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&contents).map_err(|source| GateError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        config.validate()?;
        info!(path = %path.display(), "loaded gate config");
        Ok(config)
    }

    /// Rejects combinations that would make the gate weaker than asked.
    pub fn validate(&self) -> GateResult<()> {
        if self.require_trusted_key && self.trusted_public_key.is_none() {
            return Err(GateError::Config(
                "require_trusted_key is set but trusted_public_key is missing".into(),
            ));
        }
        if self.manifest_workers == Some(0) {
            return Err(GateError::Config("manifest_workers must be at least 1".into()));
        }
        Ok(())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.manifest_path
            .clone()
            .unwrap_or_else(|| self.bundle_root.join(MANIFEST_FILE))
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.bundle_root);
        resolve(&mut self.license_path);
        for p in [
            &mut self.manifest_path,
            &mut self.trusted_public_key,
            &mut self.activation_path,
        ]
        .into_iter()
        .flatten()
        {
            resolve(p);
        }
    }
}
