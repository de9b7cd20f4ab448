//! Binned lightcurve products as written to the output store.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Errors raised while reading or writing a lightcurve file.
#[derive(Debug, thiserror::Error)]
pub enum LightCurveError {
    #[error("Failed to access lightcurve {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode lightcurve {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode lightcurve {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightCurveKind {
    Individual,
    Composite,
}

/// Provenance of a lightcurve file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightCurveHeader {
    pub kind: LightCurveKind,
    pub instrument: String,
    pub detector: String,
    pub targname: String,
    pub opt_elem: String,
    pub cenwave: i32,
    pub aperture: String,
    /// Bin width
    pub step: qtty::Seconds,
    pub min_wavelength: f64,
    pub max_wavelength: f64,
    /// Source exposure file names, in processing order
    pub members: Vec<String>,
}

/// One time bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightCurveRow {
    /// Bin start, seconds from exposure start
    pub time: f64,
    pub mjd: f64,
    pub gross: u64,
    pub net: f64,
    pub flux: f64,
    pub error: f64,
    /// Source exposure; set on composite rows only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightCurve {
    pub header: LightCurveHeader,
    pub rows: Vec<LightCurveRow>,
}

impl LightCurve {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn gross(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.gross as f64).collect()
    }

    pub fn net(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.net).collect()
    }

    pub fn mjd(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.mjd).collect()
    }

    /// Tag every row with its source exposure.
    pub fn tag_rows(&mut self, dataset: &str) {
        for row in &mut self.rows {
            row.dataset = Some(dataset.to_string());
        }
    }
}

pub fn read_lightcurve(path: impl AsRef<Path>) -> Result<LightCurve, LightCurveError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| LightCurveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| LightCurveError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a lightcurve, creating parent directories and replacing any existing file.
pub fn write_lightcurve(path: impl AsRef<Path>, curve: &LightCurve) -> Result<(), LightCurveError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| LightCurveError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let body = serde_json::to_string_pretty(curve).map_err(|source| LightCurveError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, body).map_err(|source| LightCurveError::Io {
        path: path.to_path_buf(),
        source,
    })
}
