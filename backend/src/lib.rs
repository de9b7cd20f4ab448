//! # HSTLC
//!
//! Lightcurve pipeline for time-tagged HST COS and STIS exposures.
//!
//! Calibrated photon-event files are ingested into a catalog, binned into
//! per-exposure ("individual") lightcurves, and grouped by instrument
//! configuration and target into composite lightcurves. Every product gets
//! count statistics and a Lomb-Scargle periodogram search.
//!
//! ## Architecture
//!
//! - [`api`]: catalog records and identifiers
//! - [`models`]: event files and lightcurve files on disk
//! - [`algorithms`]: quality filter, wavelength resolver, binner, statistics, periodogram
//! - [`services`]: ingest, composite building, reprocessing driver, stats table
//! - [`db`]: repository traits with in-memory and Postgres catalogs
//! - [`config`]: pipeline settings from `hstlc.toml`

// RepositoryError carries an ErrorContext
#![allow(clippy::result_large_err)]

pub mod algorithms;
pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
