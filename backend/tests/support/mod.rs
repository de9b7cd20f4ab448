//! Shared helpers for integration tests: scoped environment variables and
//! event-file fixtures.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// This is panic-safe (restores variables on unwind) and also serializes access to
/// process-global env vars to avoid flaky tests when Rust runs tests in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().expect("ENV_LOCK poisoned");
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

/// COS/FUV/HD12345/G130M/1300/PSA exposure with one event per wavelength,
/// spread evenly over `exptime` seconds.
pub fn cos_exposure(wavelengths: &[f64], exptime: f64) -> Value {
    let n = wavelengths.len();
    let times: Vec<f64> = (0..n).map(|i| i as f64 * exptime / n as f64).collect();
    json!({
        "header": {
            "TELESCOP": "HST",
            "INSTRUME": "COS",
            "DETECTOR": "FUV",
            "TARGNAME": "HD12345",
            "OPT_ELEM": "G130M",
            "CENWAVE": 1300,
            "APERTURE": "PSA",
            "OBSTYPE": "SPECTROSCOPIC",
            "FPPOS": 3,
            "CAL_VER": "3.4.0",
            "EXPFLAG": "NORMAL",
            "PROPOSID": 12000,
            "SDQFLAGS": 8346,
            "EXPTIME": exptime,
            "EXPSTART": 55000.0
        },
        "events": {
            "TIME": times,
            "WAVELENGTH": wavelengths,
            "XCORR": vec![10.0; n],
            "YCORR": vec![10.0; n],
            "DQ": vec![0; n]
        }
    })
}

/// Evenly spaced wavelengths covering `[lo, hi]` inclusive.
pub fn wavelength_span(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
        .collect()
}

pub fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, value.to_string()).expect("write fixture");
    path
}
