//! Calibrated photon-event files.
//!
//! An event file holds the scalar header of one exposure plus its columnar
//! event table:
//!
//! ```json
//! {
//!   "header": { "INSTRUME": "COS", "DETECTOR": "FUV", "SDQFLAGS": 8346, ... },
//!   "events": { "TIME": [...], "WAVELENGTH": [...], "XCORR": [...], "YCORR": [...], "DQ": [...] }
//! }
//! ```
//!
//! COS FUV exposures are split across two detector segments written to
//! sibling files (`*_corrtag_a.json` / `*_corrtag_b.json`); [`load_merged`]
//! reads both halves as one exposure.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const SEGMENT_A: &str = "_corrtag_a";
const SEGMENT_B: &str = "_corrtag_b";

/// Errors raised while reading an event file.
#[derive(Debug, thiserror::Error)]
pub enum EventFileError {
    #[error("Failed to read event file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode event file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Column {column} of {path} has {found} rows, expected {expected}")]
    ColumnLength {
        path: PathBuf,
        column: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Scalar header keywords of one exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureHeader {
    #[serde(rename = "TELESCOP", default = "default_telescope")]
    pub telescope: String,
    #[serde(rename = "INSTRUME")]
    pub instrument: String,
    #[serde(rename = "DETECTOR")]
    pub detector: String,
    #[serde(rename = "TARGNAME")]
    pub targname: String,
    #[serde(rename = "OPT_ELEM")]
    pub opt_elem: String,
    #[serde(rename = "CENWAVE", default)]
    pub cenwave: i32,
    #[serde(rename = "APERTURE")]
    pub aperture: String,
    #[serde(rename = "OBSTYPE")]
    pub obstype: String,
    #[serde(rename = "FPPOS", default)]
    pub fppos: i32,
    #[serde(rename = "CAL_VER", default)]
    pub cal_ver: String,
    #[serde(rename = "EXPFLAG", default = "default_expflag")]
    pub expflag: String,
    #[serde(rename = "PROPOSID", default)]
    pub proposid: i64,
    /// Serious data-quality mask; events with any of these bits are rejected
    #[serde(rename = "SDQFLAGS", default)]
    pub sdqflags: u32,
    /// Exposure duration in seconds
    #[serde(rename = "EXPTIME")]
    pub exptime: f64,
    /// Exposure start (MJD)
    #[serde(rename = "EXPSTART")]
    pub expstart: f64,
    /// Background count rate (counts/s) used by the header calibration
    #[serde(rename = "BKGRATE", default, skip_serializing_if = "Option::is_none")]
    pub bkgrate: Option<f64>,
    /// Inverse sensitivity (flux units per count/s) used by the header calibration
    #[serde(rename = "SENSITIV", default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<f64>,
}

fn default_telescope() -> String {
    "HST".to_string()
}

fn default_expflag() -> String {
    "NORMAL".to_string()
}

/// Columnar photon events. All columns have the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTable {
    /// Seconds since exposure start
    #[serde(rename = "TIME")]
    pub time: Vec<f64>,
    #[serde(rename = "WAVELENGTH")]
    pub wavelength: Vec<f64>,
    #[serde(rename = "XCORR")]
    pub xcorr: Vec<f64>,
    #[serde(rename = "YCORR")]
    pub ycorr: Vec<f64>,
    /// Per-event data-quality bits
    #[serde(rename = "DQ")]
    pub dq: Vec<u32>,
}

impl EventTable {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Append every column of `other` after this table's rows.
    pub fn extend(&mut self, other: &EventTable) {
        self.time.extend_from_slice(&other.time);
        self.wavelength.extend_from_slice(&other.wavelength);
        self.xcorr.extend_from_slice(&other.xcorr);
        self.ycorr.extend_from_slice(&other.ycorr);
        self.dq.extend_from_slice(&other.dq);
    }

    fn check_columns(&self, path: &Path) -> Result<(), EventFileError> {
        let expected = self.time.len();
        let columns: [(&'static str, usize); 4] = [
            ("WAVELENGTH", self.wavelength.len()),
            ("XCORR", self.xcorr.len()),
            ("YCORR", self.ycorr.len()),
            ("DQ", self.dq.len()),
        ];
        for (column, found) in columns {
            if found != expected {
                return Err(EventFileError::ColumnLength {
                    path: path.to_path_buf(),
                    column,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }
}

/// One exposure as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFile {
    pub header: ExposureHeader,
    #[serde(default)]
    pub events: EventTable,
}

/// Read and validate a single event file.
pub fn read_event_file(path: impl AsRef<Path>) -> Result<EventFile, EventFileError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| EventFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: EventFile =
        serde_json::from_str(&content).map_err(|source| EventFileError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    file.events.check_columns(path)?;
    Ok(file)
}

/// Path of the other detector segment of a two-segment exposure.
///
/// Returns `None` for files that carry no segment token.
pub fn companion_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let swapped = if name.contains(SEGMENT_A) {
        name.replacen(SEGMENT_A, SEGMENT_B, 1)
    } else if name.contains(SEGMENT_B) {
        name.replacen(SEGMENT_B, SEGMENT_A, 1)
    } else {
        return None;
    };
    Some(path.with_file_name(swapped))
}

/// Read an exposure, folding in its companion segment when one exists on disk.
///
/// The companion's events are appended after the primary's and the two
/// SDQFLAGS masks are OR-ed. A missing companion is not an error.
pub fn load_merged(path: impl AsRef<Path>) -> Result<EventFile, EventFileError> {
    let path = path.as_ref();
    let mut file = read_event_file(path)?;

    if let Some(companion) = companion_path(path).filter(|p| p.exists()) {
        let other = read_event_file(&companion)?;
        debug!(
            primary = %path.display(),
            companion = %companion.display(),
            events = other.events.len(),
            "Merging detector segments"
        );
        file.events.extend(&other.events);
        file.header.sdqflags |= other.header.sdqflags;
    }

    Ok(file)
}
