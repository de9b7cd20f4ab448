//! Pipeline configuration.
//!
//! Read from the `[pipeline]` section of `hstlc.toml` (see
//! [`crate::db::repo_config::locate_config_file`]):
//!
//! ```toml
//! [pipeline]
//! ingest_dir = "/hstlc/ingest"
//! outputs_dir = "/hstlc/outputs"
//! composite_dir = "/hstlc/outputs/composites"
//! num_workers = 8
//! individual_step = 2.0
//! composite_step = 2.0
//! bad_proposals = [13635]
//! ```
//!
//! `HSTLC_NUM_WORKERS` overrides `num_workers`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::db::repo_config::locate_config_file;
use crate::services::data_checks::CheckSettings;

pub const NUM_WORKERS_ENV: &str = "HSTLC_NUM_WORKERS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid pipeline setting {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    pipeline: PipelineConfig,
}

/// Directories, worker count and bin widths for the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Where new event files are picked up
    pub ingest_dir: PathBuf,
    /// Root of individual lightcurve products (`<outputs_dir>/<targname>/`)
    pub outputs_dir: PathBuf,
    pub composite_dir: PathBuf,
    pub num_workers: usize,
    /// Individual lightcurve bin width in seconds
    pub individual_step: f64,
    /// Composite lightcurve bin width in seconds
    pub composite_step: f64,
    /// Proposal IDs rejected by the data-quality gate
    pub bad_proposals: Vec<i64>,
    /// Shortest accepted exposure in seconds
    pub min_exptime: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ingest_dir: PathBuf::from("ingest"),
            outputs_dir: PathBuf::from("outputs"),
            composite_dir: PathBuf::from("outputs/composites"),
            num_workers: default_num_workers(),
            individual_step: 2.0,
            composite_step: 2.0,
            bad_proposals: Vec::new(),
            min_exptime: 1.0,
        }
    }
}

fn default_num_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl PipelineConfig {
    /// Parse the `[pipeline]` section of a TOML document. Missing keys take defaults.
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        file.pipeline.validated()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Load from the located `hstlc.toml` (defaults when none exists), then
    /// apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match locate_config_file() {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(raw) = std::env::var(NUM_WORKERS_ENV) {
            self.num_workers = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "num_workers",
                message: format!("{}={} is not a positive integer", NUM_WORKERS_ENV, raw),
            })?;
        }
        self.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::Invalid {
                key: "num_workers",
                message: "must be at least 1".to_string(),
            });
        }
        for (key, value) in [
            ("individual_step", self.individual_step),
            ("composite_step", self.composite_step),
        ] {
            if value <= 0.0 || !value.is_finite() {
                return Err(ConfigError::Invalid {
                    key,
                    message: format!("bin width must be positive, got {}", value),
                });
            }
        }
        Ok(self)
    }

    pub fn individual_step(&self) -> qtty::Seconds {
        qtty::Seconds::new(self.individual_step)
    }

    pub fn composite_step(&self) -> qtty::Seconds {
        qtty::Seconds::new(self.composite_step)
    }

    pub fn check_settings(&self) -> CheckSettings {
        CheckSettings {
            bad_proposals: self.bad_proposals.iter().copied().collect(),
            min_exptime: qtty::Seconds::new(self.min_exptime),
        }
    }
}
