//! Common wavelength interval of a dataset group.
//!
//! Every member exposure narrows the running interval to the span of its own
//! good events, so the composite only uses wavelengths that all contributing
//! exposures cover.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use super::quality::good_event_indices;
use crate::models::{load_merged, EventFile};

pub const DEFAULT_MIN_WAVELENGTH: f64 = 700.0;
pub const DEFAULT_MAX_WAVELENGTH: f64 = 20000.0;

/// Closed wavelength interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WavelengthRange {
    pub min: f64,
    pub max: f64,
}

impl Default for WavelengthRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_WAVELENGTH,
            max: DEFAULT_MAX_WAVELENGTH,
        }
    }
}

impl WavelengthRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, wavelength: f64) -> bool {
        wavelength >= self.min && wavelength <= self.max
    }

    /// Narrow to an exposure spanning `[emin, emax]`.
    ///
    /// Returns `None` when the result would invert, i.e. the exposure does not
    /// overlap the current interval at all.
    pub fn narrow(&self, emin: f64, emax: f64) -> Option<WavelengthRange> {
        let min = if emin > self.min { emin } else { self.min };
        let max = if emax < self.max { emax } else { self.max };
        (min <= max).then_some(WavelengthRange { min, max })
    }
}

/// Wavelength span `(min, max)` of the good events of one exposure.
pub fn exposure_extent(file: &EventFile) -> Option<(f64, f64)> {
    let good = good_event_indices(&file.events, file.header.sdqflags);
    if good.is_empty() {
        return None;
    }
    let wavelengths = &file.events.wavelength;
    let (min, max) = good.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
        (lo.min(wavelengths[i]), hi.max(wavelengths[i]))
    });
    Some((min, max))
}

/// Fold already-loaded exposures into a common interval starting from the defaults.
pub fn resolve_from_files<'a, I>(files: I) -> WavelengthRange
where
    I: IntoIterator<Item = (&'a str, &'a EventFile)>,
{
    let mut range = WavelengthRange::default();
    for (name, file) in files {
        range = fold_exposure(range, name, file);
    }
    range
}

/// Resolve the common interval of a group by reading every member exposure.
///
/// Members that cannot be read, or that have no good events, are logged and
/// do not contribute. With no contributing member the defaults are returned.
pub fn resolve_wavelength_range<P: AsRef<Path>>(members: &[P]) -> WavelengthRange {
    let mut range = WavelengthRange::default();
    for member in members {
        let path = member.as_ref();
        match load_merged(path) {
            Ok(file) => {
                range = fold_exposure(range, &path.display().to_string(), &file);
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping unreadable exposure for wavelength range");
            }
        }
    }
    debug!(min = range.min, max = range.max, "Resolved wavelength range");
    range
}

fn fold_exposure(range: WavelengthRange, name: &str, file: &EventFile) -> WavelengthRange {
    let Some((emin, emax)) = exposure_extent(file) else {
        warn!(file = name, "No good events; exposure does not constrain wavelength range");
        return range;
    };
    match range.narrow(emin, emax) {
        Some(narrowed) => narrowed,
        None => {
            warn!(
                file = name,
                emin,
                emax,
                min = range.min,
                max = range.max,
                "Exposure does not overlap the group wavelength range"
            );
            range
        }
    }
}
