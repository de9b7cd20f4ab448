//! Numerical core of the lightcurve pipeline.
//!
//! - [`quality`]: per-event data-quality screen
//! - [`wavelength`]: common wavelength interval of a dataset group
//! - [`binning`]: fixed-width time binning and calibration
//! - [`statistics`]: count statistics and Pearson correlation
//! - [`periodogram`]: Lomb-Scargle periodogram and significance test

pub mod binning;
pub mod periodogram;
pub mod quality;
pub mod statistics;
pub mod wavelength;

pub use binning::{bin_events, build_lightcurve, BinningError, Calibration, HeaderCalibration};
pub use periodogram::{is_interesting, periodograms, BandPeriodogram, PeriodBand, INTERESTING_POWER};
pub use quality::good_event_indices;
pub use statistics::{compute_stats, CountStats, POISSON_FACTOR_SENTINEL};
pub use wavelength::{resolve_wavelength_range, WavelengthRange};
