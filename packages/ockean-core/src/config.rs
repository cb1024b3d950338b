//! Settings loaded from a TOML file.
//!
//! ```toml
//! store_path = "/data/ockean/prices.json"
//! output_dir = "outputs"
//!
//! [clustering]
//! restarts = 25
//! seed = 42
//! max_iterations = 300
//!
//! [scan]
//! k_min = 2
//! k_max = 10
//! ```
//!
//! Every key is optional; missing keys take their defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clustering::ClusterParams;
use crate::Result;

/// Default k window for silhouette scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub k_min: usize,
    pub k_max: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self { k_min: 2, k_max: 10 }
    }
}

/// Command-line defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Price store file; `None` falls back to the store's default path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    /// Directory for report artifacts
    pub output_dir: PathBuf,
    pub clustering: ClusterParams,
    pub scan: ScanSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: None,
            output_dir: PathBuf::from("outputs"),
            clustering: ClusterParams::default(),
            scan: ScanSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from [`Settings::default_path`] when no
    /// path is given.
    ///
    /// A missing file yields the defaults. A file that exists but does not
    /// parse is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path(),
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file; using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let settings = Self::from_toml(&content)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Default config location.
    ///
    /// `OCKEAN_CONFIG` when set, else `<config dir>/ockean/config.toml`.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = env::var("OCKEAN_CONFIG") {
            return PathBuf::from(path);
        }

        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("ockean/config.toml"))
            .unwrap_or_else(|| PathBuf::from("ockean.toml"))
    }

    /// Clustering parameters with optional per-invocation overrides.
    pub fn cluster_params(&self, restarts: Option<usize>, seed: Option<u64>) -> ClusterParams {
        ClusterParams {
            restarts: restarts.unwrap_or(self.clustering.restarts),
            seed: seed.unwrap_or(self.clustering.seed),
            ..self.clustering
        }
    }
}
