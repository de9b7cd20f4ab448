//! Event binning into fixed-width time series.
//!
//! Counts are converted to net counts and flux through a [`Calibration`],
//! which is where instrument-specific background and sensitivity models plug
//! in. [`HeaderCalibration`] reads both from optional header keywords.

use qtty::Day;
use tracing::debug;

use super::quality::is_good_event;
use super::wavelength::WavelengthRange;
use crate::models::{EventFile, ExposureHeader, LightCurve, LightCurveHeader, LightCurveKind, LightCurveRow};

/// Upper bound on bins per exposure; a longer series means a corrupt EXPTIME or TIME column.
pub const MAX_BINS: usize = 10_000_000;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BinningError {
    #[error("Bin width must be positive, got {0} s")]
    InvalidStep(f64),

    #[error("Exposure spans {span} s, too many bins of {step} s")]
    TooManyBins { span: f64, step: f64 },
}

fn checked_bins(bins: f64, span: f64, step: f64) -> Result<usize, BinningError> {
    if !bins.is_finite() || bins > MAX_BINS as f64 {
        return Err(BinningError::TooManyBins { span, step });
    }
    Ok(bins as usize)
}

/// Instrument calibration used to turn counts into physical units.
pub trait Calibration: Send + Sync {
    /// Background count rate in counts per second.
    fn background_rate(&self, header: &ExposureHeader) -> f64;

    /// Multiplier from count rate to flux.
    fn sensitivity(&self, header: &ExposureHeader) -> f64;
}

/// Reads `BKGRATE` and `SENSITIV` from the exposure header (0 and 1 when absent).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderCalibration;

impl Calibration for HeaderCalibration {
    fn background_rate(&self, header: &ExposureHeader) -> f64 {
        header.bkgrate.unwrap_or(0.0)
    }

    fn sensitivity(&self, header: &ExposureHeader) -> f64 {
        header.sensitivity.unwrap_or(1.0)
    }
}

/// Lightcurve header describing `header`'s exposure binned at `step` over `range`.
pub fn lightcurve_header(
    header: &ExposureHeader,
    kind: LightCurveKind,
    step: qtty::Seconds,
    range: WavelengthRange,
    members: Vec<String>,
) -> LightCurveHeader {
    LightCurveHeader {
        kind,
        instrument: header.instrument.clone(),
        detector: header.detector.clone(),
        targname: header.targname.clone(),
        opt_elem: header.opt_elem.clone(),
        cenwave: header.cenwave,
        aperture: header.aperture.clone(),
        step,
        min_wavelength: range.min,
        max_wavelength: range.max,
        members,
    }
}

/// Bin the good events of one exposure that fall inside `range`.
///
/// # Arguments
/// * `file` - Merged exposure
/// * `range` - Wavelength interval to keep
/// * `step` - Bin width
/// * `calibration` - Background and sensitivity model
///
/// # Returns
/// Rows covering `[0, EXPTIME)` in `step` increments, the last bin truncated
/// to the exposure end. When EXPTIME is not positive the bins cover the span
/// of the event times instead.
pub fn bin_events(
    file: &EventFile,
    range: WavelengthRange,
    step: qtty::Seconds,
    calibration: &dyn Calibration,
) -> Result<Vec<LightCurveRow>, BinningError> {
    let width = step.value();
    if width <= 0.0 || !width.is_finite() {
        return Err(BinningError::InvalidStep(width));
    }

    let header = &file.header;
    let events = &file.events;

    let (start, end, n_bins) = if header.exptime > 0.0 {
        let n = checked_bins((header.exptime / width).ceil(), header.exptime, width)?;
        (0.0, header.exptime, n)
    } else {
        let (lo, hi) = events
            .time
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| (lo.min(t), hi.max(t)));
        if lo > hi {
            return Ok(Vec::new());
        }
        let n = checked_bins(((hi - lo) / width).floor() + 1.0, hi - lo, width)?;
        (lo, lo + n as f64 * width, n)
    };

    let mut gross = vec![0u64; n_bins];
    for i in 0..events.len() {
        if !is_good_event(events, i, header.sdqflags) || !range.contains(events.wavelength[i]) {
            continue;
        }
        let t = events.time[i];
        if t < start || t >= end {
            continue;
        }
        let idx = (((t - start) / width).floor() as usize).min(n_bins - 1);
        gross[idx] += 1;
    }

    let bkg_rate = calibration.background_rate(header);
    let sensitivity = calibration.sensitivity(header);

    let rows: Vec<LightCurveRow> = gross
        .into_iter()
        .enumerate()
        .map(|(i, counts)| {
            let bin_start = start + i as f64 * width;
            let exposure = width.min(end - bin_start);
            let background = bkg_rate * exposure;
            let net = counts as f64 - background;
            let (flux, error) = if exposure > 0.0 {
                (
                    net / exposure * sensitivity,
                    (counts as f64 + background).sqrt() / exposure * sensitivity,
                )
            } else {
                (0.0, 0.0)
            };
            LightCurveRow {
                time: bin_start,
                mjd: header.expstart + qtty::Seconds::new(bin_start).to::<Day>().value(),
                gross: counts,
                net,
                flux,
                error,
                dataset: None,
            }
        })
        .collect();

    debug!(bins = rows.len(), step = width, "Binned exposure");
    Ok(rows)
}

/// Bin one exposure into a standalone lightcurve.
pub fn build_lightcurve(
    name: &str,
    file: &EventFile,
    kind: LightCurveKind,
    range: WavelengthRange,
    step: qtty::Seconds,
    calibration: &dyn Calibration,
) -> Result<LightCurve, BinningError> {
    let rows = bin_events(file, range, step, calibration)?;
    Ok(LightCurve {
        header: lightcurve_header(&file.header, kind, step, range, vec![name.to_string()]),
        rows,
    })
}
