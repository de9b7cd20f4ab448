//! Catalog entities shared by the pipeline services, the repositories and the binaries.
//!
//! All types derive Serialize/Deserialize so they can be logged, dumped to JSON,
//! or stored verbatim by the in-memory repository.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

crate::define_id_type!(
    /// Exposure identifier (primary key of the `metadata` table).
    ExposureId
);
crate::define_id_type!(
    /// Output record identifier (primary key of the `outputs` table).
    OutputId
);
crate::define_id_type!(
    /// Stats record identifier (primary key of the `stats` table).
    StatsId
);
crate::define_id_type!(
    /// Bad-data record identifier (primary key of the `bad_data` table).
    BadDataId
);

/// Instrument that produced an exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Instrument {
    #[serde(rename = "COS")]
    Cos,
    #[serde(rename = "STIS")]
    Stis,
}

impl Instrument {
    pub fn as_str(&self) -> &'static str {
        match self {
            Instrument::Cos => "COS",
            Instrument::Stis => "STIS",
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Instrument {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "COS" => Ok(Self::Cos),
            "STIS" => Ok(Self::Stis),
            other => Err(format!("Unknown instrument: {}", other)),
        }
    }
}

/// Observation type recorded in the `OBSTYPE` header keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObsType {
    #[serde(rename = "SPECTROSCOPIC")]
    Spectroscopic,
    #[serde(rename = "IMAGING")]
    Imaging,
}

impl ObsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObsType::Spectroscopic => "SPECTROSCOPIC",
            ObsType::Imaging => "IMAGING",
        }
    }
}

impl fmt::Display for ObsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObsType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SPECTROSCOPIC" => Ok(Self::Spectroscopic),
            "IMAGING" => Ok(Self::Imaging),
            other => Err(format!("Unknown observation type: {}", other)),
        }
    }
}

/// One calibrated observation (a row of the `metadata` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exposure {
    /// Catalog id, `None` until the exposure has been stored
    #[serde(default)]
    pub id: Option<ExposureId>,
    /// Globally unique file name
    pub filename: String,
    /// Directory holding the file
    pub path: String,
    pub telescope: String,
    pub instrument: Instrument,
    pub detector: String,
    pub targname: String,
    /// Calibration software version
    pub cal_ver: String,
    pub obstype: ObsType,
    /// Central wavelength; 0 for imaging exposures
    pub cenwave: i32,
    /// Grating / optical element
    pub opt_elem: String,
    pub aperture: String,
    /// Focal-plane position; 0 for STIS
    pub fppos: i32,
    pub ingest_date: NaiveDate,
}

impl Exposure {
    /// Grouping key of the dataset this exposure belongs to.
    pub fn dataset_key(&self) -> DatasetKey {
        DatasetKey {
            instrument: self.instrument,
            detector: self.detector.clone(),
            targname: self.targname.clone(),
            opt_elem: self.opt_elem.clone(),
            cenwave: self.cenwave,
            aperture: self.aperture.clone(),
        }
    }

    pub fn full_path(&self) -> PathBuf {
        Path::new(&self.path).join(&self.filename)
    }
}

/// Output products of one exposure (a row of the `outputs` table).
///
/// `composite_path == None` marks the exposure's dataset as pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    #[serde(default)]
    pub id: Option<OutputId>,
    pub exposure_id: ExposureId,
    pub individual_path: String,
    pub individual_filename: String,
    #[serde(default)]
    pub composite_path: Option<String>,
    #[serde(default)]
    pub composite_filename: Option<String>,
}

impl OutputRecord {
    pub fn is_pending(&self) -> bool {
        self.composite_path.is_none()
    }

    pub fn individual_lightcurve(&self) -> PathBuf {
        Path::new(&self.individual_path).join(&self.individual_filename)
    }

    pub fn composite_lightcurve(&self) -> Option<PathBuf> {
        match (&self.composite_path, &self.composite_filename) {
            (Some(path), Some(filename)) => Some(Path::new(path).join(filename)),
            _ => None,
        }
    }
}

/// Six-tuple identifying a dataset group. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetKey {
    pub instrument: Instrument,
    pub detector: String,
    pub targname: String,
    pub opt_elem: String,
    pub cenwave: i32,
    pub aperture: String,
}

impl DatasetKey {
    /// Deterministic composite product file name, so reprocessing overwrites.
    pub fn composite_filename(&self) -> String {
        format!(
            "hlsp_hstlc_hst_{}-{}_{}_{}_{}_{}_v1_sci.json",
            self.instrument, self.detector, self.targname, self.opt_elem, self.cenwave, self.aperture
        )
        .to_lowercase()
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}/{}",
            self.instrument, self.detector, self.targname, self.opt_elem, self.cenwave, self.aperture
        )
    }
}

/// Member exposure of a dataset group as returned by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: ExposureId,
    pub path: String,
    pub filename: String,
}

impl GroupMember {
    pub fn full_path(&self) -> PathBuf {
        Path::new(&self.path).join(&self.filename)
    }
}

/// Statistics of one lightcurve product (a row of the `stats` table).
///
/// Identity is `lightcurve_filename`. When `total == 0` every derived field is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    #[serde(default)]
    pub id: Option<StatsId>,
    pub lightcurve_path: String,
    pub lightcurve_filename: String,
    pub total: i64,
    pub mean: Option<f64>,
    pub mu: Option<f64>,
    pub stdev: Option<f64>,
    pub poisson_factor: Option<f64>,
    pub pearson_r: Option<f64>,
    pub pearson_p: Option<f64>,
    pub periodogram: bool,
    /// Manual curation flag; the pipeline never sets it
    #[serde(default)]
    pub deliver: bool,
}

/// Reason an exposure was rejected by the data-quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BadDataReason {
    #[serde(rename = "Bad EXPFLAG")]
    BadExpflag,
    #[serde(rename = "Non-linear time")]
    NonLinearTime,
    #[serde(rename = "No events")]
    NoEvents,
    #[serde(rename = "Singular event")]
    SingularEvent,
    #[serde(rename = "Bad Proposal")]
    BadProposal,
    #[serde(rename = "Short Exposure")]
    ShortExposure,
}

impl BadDataReason {
    pub const ALL: [BadDataReason; 6] = [
        BadDataReason::BadExpflag,
        BadDataReason::NonLinearTime,
        BadDataReason::NoEvents,
        BadDataReason::SingularEvent,
        BadDataReason::BadProposal,
        BadDataReason::ShortExposure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BadDataReason::BadExpflag => "Bad EXPFLAG",
            BadDataReason::NonLinearTime => "Non-linear time",
            BadDataReason::NoEvents => "No events",
            BadDataReason::SingularEvent => "Singular event",
            BadDataReason::BadProposal => "Bad Proposal",
            BadDataReason::ShortExposure => "Short Exposure",
        }
    }
}

impl fmt::Display for BadDataReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BadDataReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| format!("Unknown bad data reason: {}", s))
    }
}

/// A raw file rejected before it ever became an [`Exposure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadDataRecord {
    #[serde(default)]
    pub id: Option<BadDataId>,
    pub filename: String,
    pub ingest_date: NaiveDate,
    pub reason: BadDataReason,
}

/// Which lightcurve products a stats run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Individual,
    Composite,
    Both,
}

impl FromStr for ProductType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "individual" => Ok(Self::Individual),
            "composite" => Ok(Self::Composite),
            "both" => Ok(Self::Both),
            other => Err(format!(
                "{} is not a valid option. Please choose \"individual\", \"composite\", or \"both\".",
                other
            )),
        }
    }
}
