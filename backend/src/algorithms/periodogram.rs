//! Lomb-Scargle periodogram and three-sigma significance test.
//!
//! A lightcurve is searched in three period bands. Local maxima of the
//! normalized power that exceed `mean + 3 * std` of the band's power are
//! significant; the lightcurve is interesting when the strongest significant
//! peak of any band reaches [`INTERESTING_POWER`].

use qtty::{Day, Hours, Minutes};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::statistics::{mean, population_std};

/// Minimum significant power for a lightcurve to be flagged.
pub const INTERESTING_POWER: f64 = 0.30;

/// Significance threshold in standard deviations above the mean power.
pub const SIGMA_THRESHOLD: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodBand {
    /// Bin width up to 10 minutes
    Short,
    /// 10 minutes to 1 hour
    Medium,
    /// 1 hour to 10 hours
    Long,
}

impl PeriodBand {
    pub const ALL: [PeriodBand; 3] = [PeriodBand::Short, PeriodBand::Medium, PeriodBand::Long];

    /// Period bounds of the band, in days.
    pub fn bounds(&self, step: qtty::Seconds) -> (qtty::Days, qtty::Days) {
        let ten_minutes = Minutes::new(10.0).to::<Day>();
        let one_hour = Hours::new(1.0).to::<Day>();
        let ten_hours = Hours::new(10.0).to::<Day>();
        match self {
            PeriodBand::Short => (step.to::<Day>(), ten_minutes),
            PeriodBand::Medium => (ten_minutes, one_hour),
            PeriodBand::Long => (one_hour, ten_hours),
        }
    }
}

/// Periodogram of one band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandPeriodogram {
    pub band: PeriodBand,
    /// Trial periods in days
    pub periods: Vec<f64>,
    /// Normalized power per trial period
    pub power: Vec<f64>,
    pub mean: f64,
    pub std: f64,
    pub threshold: f64,
    pub significant_periods: Vec<f64>,
    pub significant_powers: Vec<f64>,
}

impl BandPeriodogram {
    pub fn max_significant_power(&self) -> Option<f64> {
        self.significant_powers.iter().copied().reduce(f64::max)
    }
}

/// `n` evenly spaced values over `[lo, hi]`, both ends included.
pub fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let delta = (hi - lo) / (n - 1) as f64;
            (0..n).map(|i| lo + delta * i as f64).collect()
        }
    }
}

/// Classic (unnormalized) Lomb-Scargle power of `values` sampled at `times`.
pub fn lomb_scargle(times: &[f64], values: &[f64], angular_freqs: &[f64]) -> Vec<f64> {
    angular_freqs
        .iter()
        .map(|&w| {
            let (mut s2, mut c2) = (0.0, 0.0);
            for &t in times {
                s2 += (2.0 * w * t).sin();
                c2 += (2.0 * w * t).cos();
            }
            let tau = s2.atan2(c2) / (2.0 * w);

            let (mut yc, mut ys, mut cc, mut ss) = (0.0, 0.0, 0.0, 0.0);
            for (&t, &y) in times.iter().zip(values) {
                let arg = w * (t - tau);
                let (s, c) = arg.sin_cos();
                yc += y * c;
                ys += y * s;
                cc += c * c;
                ss += s * s;
            }

            let mut p = 0.0;
            if cc > 0.0 {
                p += yc * yc / cc;
            }
            if ss > 0.0 {
                p += ys * ys / ss;
            }
            0.5 * p
        })
        .collect()
}

/// Indices strictly greater than both neighbours. Endpoints never qualify.
pub fn local_maxima(values: &[f64]) -> Vec<usize> {
    if values.len() < 3 {
        return Vec::new();
    }
    (1..values.len() - 1)
        .filter(|&i| values[i] > values[i - 1] && values[i] > values[i + 1])
        .collect()
}

/// Periodogram of `counts` over one band.
///
/// # Arguments
/// * `times` - Bin times in MJD
/// * `counts` - Counts per bin
/// * `step` - Bin width of the lightcurve; lower edge of the short band
/// * `band` - Period band to search
pub fn band_periodogram(
    times: &[f64],
    counts: &[f64],
    step: qtty::Seconds,
    band: PeriodBand,
) -> BandPeriodogram {
    let n = times.len().min(counts.len());
    let times = &times[..n];
    let counts = &counts[..n];

    let (lo, hi) = band.bounds(step);
    let periods: Vec<f64> = linspace(lo.value(), hi.value(), n)
        .into_iter()
        .filter(|p| *p > 0.0)
        .collect();
    let angular_freqs: Vec<f64> = periods.iter().map(|p| 2.0 * PI / p).collect();

    let center = mean(counts);
    let variance = population_std(counts).powi(2);
    let power: Vec<f64> = if variance > 0.0 {
        let centered: Vec<f64> = counts.iter().map(|c| c - center).collect();
        let scale = 2.0 / (n as f64 * variance);
        lomb_scargle(times, &centered, &angular_freqs)
            .into_iter()
            .map(|p| p * scale)
            .collect()
    } else {
        vec![0.0; periods.len()]
    };

    let power_mean = mean(&power);
    let power_std = population_std(&power);
    let threshold = power_mean + SIGMA_THRESHOLD * power_std;

    let (significant_periods, significant_powers) = local_maxima(&power)
        .into_iter()
        .filter(|&i| power[i] > threshold)
        .map(|i| (periods[i], power[i]))
        .unzip();

    BandPeriodogram {
        band,
        periods,
        power,
        mean: power_mean,
        std: power_std,
        threshold,
        significant_periods,
        significant_powers,
    }
}

/// Periodograms of all three bands.
pub fn periodograms(times: &[f64], counts: &[f64], step: qtty::Seconds) -> Vec<BandPeriodogram> {
    PeriodBand::ALL
        .iter()
        .map(|&band| band_periodogram(times, counts, step, band))
        .collect()
}

/// Whether any band has a significant peak of at least [`INTERESTING_POWER`].
pub fn is_interesting(times: &[f64], counts: &[f64], step: qtty::Seconds) -> bool {
    periodograms(times, counts, step)
        .iter()
        .filter_map(BandPeriodogram::max_significant_power)
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))))
        .is_some_and(|max| max >= INTERESTING_POWER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const STEP: f64 = 2.0;
    const N: usize = 600;

    fn bin_times() -> Vec<f64> {
        (0..N).map(|i| 55000.0 + i as f64 * STEP / 86400.0).collect()
    }

    /// Deterministic pseudo-random counts in `[90, 110)`.
    fn noise(seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..N)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                90.0 + ((state >> 33) % 20) as f64
            })
            .collect()
    }

    #[test]
    fn test_band_bounds() {
        let step = qtty::Seconds::new(STEP);
        let (lo, hi) = PeriodBand::Short.bounds(step);
        assert_relative_eq!(lo.value(), 2.0 / 86400.0, epsilon = 1e-15);
        assert_relative_eq!(hi.value(), 10.0 / 1440.0, epsilon = 1e-15);
        let (lo, hi) = PeriodBand::Medium.bounds(step);
        assert_relative_eq!(lo.value(), 10.0 / 1440.0, epsilon = 1e-15);
        assert_relative_eq!(hi.value(), 1.0 / 24.0, epsilon = 1e-15);
        let (lo, hi) = PeriodBand::Long.bounds(step);
        assert_relative_eq!(lo.value(), 1.0 / 24.0, epsilon = 1e-15);
        assert_relative_eq!(hi.value(), 10.0 / 24.0, epsilon = 1e-15);
    }

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_local_maxima_excludes_endpoints_and_plateaus() {
        assert_eq!(local_maxima(&[5.0, 1.0, 3.0, 2.0, 2.0, 4.0, 4.0, 1.0, 9.0]), vec![2]);
        assert!(local_maxima(&[1.0, 2.0]).is_empty());
    }

    #[test]
    fn test_strong_sinusoid_is_detected() {
        let times = bin_times();
        let period_days = 300.0 / 86400.0;
        let counts: Vec<f64> = times
            .iter()
            .map(|t| 100.0 + 50.0 * (2.0 * PI * (t - times[0]) / period_days).sin())
            .collect();
        let step = qtty::Seconds::new(STEP);

        let short = band_periodogram(&times, &counts, step, PeriodBand::Short);
        let peak = short.max_significant_power().unwrap();
        assert!(peak >= INTERESTING_POWER);

        let best = short
            .significant_powers
            .iter()
            .position(|p| *p == peak)
            .map(|i| short.significant_periods[i])
            .unwrap();
        assert!((best * 86400.0 - 300.0).abs() < 5.0);
        assert!(is_interesting(&times, &counts, step));
    }

    #[test]
    fn test_noise_is_not_interesting() {
        let times = bin_times();
        let step = qtty::Seconds::new(STEP);
        for seed in [1, 7, 42] {
            let counts = noise(seed);
            for band in periodograms(&times, &counts, step) {
                assert_eq!(band.power.len(), N);
                assert!(
                    band.significant_powers.iter().all(|p| *p < INTERESTING_POWER),
                    "{:?} band flagged noise: {:?}",
                    band.band,
                    band.significant_powers
                );
            }
            assert!(!is_interesting(&times, &counts, step));
        }
    }

    #[test]
    fn test_constant_counts_have_zero_power() {
        let times = bin_times();
        let counts = vec![10.0; N];
        let result = band_periodogram(&times, &counts, qtty::Seconds::new(STEP), PeriodBand::Medium);
        assert!(result.power.iter().all(|p| *p == 0.0));
        assert!(result.significant_powers.is_empty());
        assert!(!is_interesting(&times, &counts, qtty::Seconds::new(STEP)));
    }

    #[test]
    fn test_short_series() {
        let result = band_periodogram(&[55000.0, 55000.1], &[1.0, 2.0], qtty::Seconds::new(STEP), PeriodBand::Long);
        assert_eq!(result.periods.len(), 2);
        assert!(result.significant_periods.is_empty());
        assert!(!is_interesting(&[], &[], qtty::Seconds::new(STEP)));
    }
}
