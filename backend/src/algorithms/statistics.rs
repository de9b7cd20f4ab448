//! Distributional statistics of a binned count series.

use serde::{Deserialize, Serialize};

/// Poisson factor reported when the mean count rate is zero.
pub const POISSON_FACTOR_SENTINEL: f64 = 9_999_999.0;

/// Summary statistics of a count series.
///
/// When `total == 0` every derived field is `None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CountStats {
    pub total: i64,
    pub mean: Option<f64>,
    /// Square root of the mean: the expected Poisson spread
    pub mu: Option<f64>,
    /// Population standard deviation
    pub stdev: Option<f64>,
    /// Ratio of observed to Poisson spread
    pub poisson_factor: Option<f64>,
    pub pearson_r: Option<f64>,
    pub pearson_p: Option<f64>,
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population (ddof = 0) standard deviation.
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Observed spread over Poisson spread, or [`POISSON_FACTOR_SENTINEL`] when `mu` is zero.
pub fn poisson_factor(stdev: f64, mu: f64) -> f64 {
    if mu == 0.0 {
        POISSON_FACTOR_SENTINEL
    } else {
        stdev / mu
    }
}

/// Compute count statistics and the counts-versus-time correlation.
///
/// # Arguments
/// * `counts` - Gross counts per bin
/// * `times` - Bin times (MJD), same length as `counts`
pub fn compute_stats(counts: &[f64], times: &[f64]) -> CountStats {
    let total = counts.iter().sum::<f64>().round() as i64;
    if total == 0 {
        return CountStats {
            total,
            ..Default::default()
        };
    }

    let mean = mean(counts);
    let mu = mean.sqrt();
    let stdev = population_std(counts);
    let poisson_factor = poisson_factor(stdev, mu);
    let (pearson_r, pearson_p) = match pearson(times, counts) {
        Some((r, p)) => (Some(r), Some(p)),
        None => (None, None),
    };

    CountStats {
        total,
        mean: Some(mean),
        mu: Some(mu),
        stdev: Some(stdev),
        poisson_factor: Some(poisson_factor),
        pearson_r,
        pearson_p,
    }
}

/// Pearson correlation coefficient and two-sided p-value.
///
/// Returns `None` when the series differ in length, have fewer than two
/// points, or either has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let n = x.len();
    let mean_x = mean(x);
    let mean_y = mean(y);

    let mut numerator = 0.0;
    let mut sum_sq_x = 0.0;
    let mut sum_sq_y = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        numerator += dx * dy;
        sum_sq_x += dx * dx;
        sum_sq_y += dy * dy;
    }

    let denominator = (sum_sq_x * sum_sq_y).sqrt();
    if denominator == 0.0 {
        return None;
    }
    let r = (numerator / denominator).clamp(-1.0, 1.0);

    let p = if n == 2 {
        1.0
    } else if r.abs() >= 1.0 {
        0.0
    } else {
        let df = (n - 2) as f64;
        let t_sq = r * r * df / (1.0 - r * r);
        regularized_incomplete_beta(df / (df + t_sq), df / 2.0, 0.5)
    };

    Some((r, p))
}

fn ln_gamma(x: f64) -> f64 {
    // Lanczos approximation, g = 7
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut a = COEFFS[0];
    let t = x + 7.5;
    for (i, c) in COEFFS.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

/// Regularized incomplete beta function I_x(a, b).
fn regularized_incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - front * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

/// Modified Lentz evaluation of the incomplete beta continued fraction.
fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 1e-15;
    const TINY: f64 = 1e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}
