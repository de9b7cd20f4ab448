//! Individual and composite lightcurve products.
//!
//! Both functions here are synchronous and CPU-bound; async callers run
//! them under `spawn_blocking`.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::algorithms::binning::{bin_events, lightcurve_header, BinningError, Calibration};
use crate::algorithms::wavelength::{resolve_from_files, resolve_wavelength_range, WavelengthRange};
use crate::api::{DatasetKey, ExposureId, GroupMember};
use crate::models::{
    load_merged, write_lightcurve, EventFileError, LightCurve, LightCurveError, LightCurveKind,
};

/// Why one exposure could not be binned.
#[derive(Debug, thiserror::Error)]
pub enum MemberError {
    #[error(transparent)]
    Read(#[from] EventFileError),

    #[error(transparent)]
    Binning(#[from] BinningError),
}

#[derive(Debug, thiserror::Error)]
pub enum CompositeError {
    #[error("Failed to build lightcurve for {file}")]
    Member {
        file: String,
        #[source]
        source: MemberError,
    },

    #[error(transparent)]
    Write(#[from] LightCurveError),

    #[error("Dataset {key} has no member exposures")]
    EmptyGroup { key: DatasetKey },

    #[error("No member of dataset {key} could be binned ({failed} failed)")]
    NoUsableMembers { key: DatasetKey, failed: usize },
}

/// Location of an individual lightcurve product.
#[derive(Debug, Clone, PartialEq)]
pub struct IndividualProduct {
    pub path: PathBuf,
    pub filename: String,
    /// `false` when the file already existed and was left alone
    pub created: bool,
}

impl IndividualProduct {
    pub fn full_path(&self) -> PathBuf {
        self.path.join(&self.filename)
    }
}

/// `lb4m01010_corrtag_a.json` -> `lb4m01010_curve.json`.
pub fn individual_filename(event_filename: &str) -> String {
    let rootname = event_filename
        .split('_')
        .next()
        .unwrap_or(event_filename)
        .trim_end_matches(".json");
    format!("{}_curve.json", rootname)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Build the individual lightcurve of one exposure under
/// `<outputs_dir>/<targname>/`.
///
/// An existing product is never recomputed or rewritten.
pub fn make_individual(
    event_path: &Path,
    outputs_dir: &Path,
    step: qtty::Seconds,
    calibration: &dyn Calibration,
) -> Result<IndividualProduct, CompositeError> {
    let name = file_name_of(event_path);
    let member_err = |source: MemberError| CompositeError::Member {
        file: name.clone(),
        source,
    };

    let file = load_merged(event_path).map_err(|e| member_err(e.into()))?;
    let product = IndividualProduct {
        path: outputs_dir.join(&file.header.targname),
        filename: individual_filename(&name),
        created: false,
    };

    if product.full_path().exists() {
        return Ok(product);
    }

    let range = resolve_from_files([(name.as_str(), &file)]);
    let rows = bin_events(&file, range, step, calibration).map_err(|e| member_err(e.into()))?;
    let curve = LightCurve {
        header: lightcurve_header(
            &file.header,
            LightCurveKind::Individual,
            step,
            range,
            vec![name.clone()],
        ),
        rows,
    };
    write_lightcurve(product.full_path(), &curve)?;
    info!(file = %name, output = %product.full_path().display(), "Created individual lightcurve");

    Ok(IndividualProduct {
        created: true,
        ..product
    })
}

/// Result of binning a dataset group.
#[derive(Debug, Clone)]
pub struct CompositeBuild {
    pub curve: LightCurve,
    /// Members whose rows are in `curve`, in processing order
    pub included: Vec<ExposureId>,
    /// File names of members that failed and were left out
    pub excluded: Vec<String>,
}

fn bin_member(
    member: &GroupMember,
    range: WavelengthRange,
    step: qtty::Seconds,
    calibration: &dyn Calibration,
) -> Result<LightCurve, MemberError> {
    let file = load_merged(member.full_path())?;
    let rows = bin_events(&file, range, step, calibration)?;
    let mut curve = LightCurve {
        header: lightcurve_header(
            &file.header,
            LightCurveKind::Composite,
            step,
            range,
            vec![member.filename.clone()],
        ),
        rows,
    };
    curve.tag_rows(&member.filename);
    Ok(curve)
}

/// Bin every member over the group's common wavelength interval and
/// concatenate the rows in member order.
///
/// A member that fails is logged and excluded; the build fails only when no
/// member succeeds.
pub fn build_composite(
    key: &DatasetKey,
    members: &[GroupMember],
    step: qtty::Seconds,
    calibration: &dyn Calibration,
) -> Result<CompositeBuild, CompositeError> {
    if members.is_empty() {
        return Err(CompositeError::EmptyGroup { key: key.clone() });
    }

    let paths: Vec<PathBuf> = members.iter().map(GroupMember::full_path).collect();
    let range = resolve_wavelength_range(&paths);

    let mut composite: Option<LightCurve> = None;
    let mut included = Vec::with_capacity(members.len());
    let mut excluded = Vec::new();

    for member in members {
        match bin_member(member, range, step, calibration) {
            Ok(curve) => {
                included.push(member.id);
                match composite.as_mut() {
                    Some(acc) => {
                        acc.header.members.push(member.filename.clone());
                        acc.rows.extend(curve.rows);
                    }
                    None => composite = Some(curve),
                }
            }
            Err(e) => {
                warn!(
                    dataset = %key,
                    file = %member.filename,
                    error = %e,
                    "Excluding exposure from composite"
                );
                excluded.push(member.filename.clone());
            }
        }
    }

    let curve = composite.ok_or_else(|| CompositeError::NoUsableMembers {
        key: key.clone(),
        failed: excluded.len(),
    })?;

    Ok(CompositeBuild {
        curve,
        included,
        excluded,
    })
}
