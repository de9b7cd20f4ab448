//! Ingest new event files, then rebuild the composites they touch.
//!
//! # Usage
//!
//! ```bash
//! HSTLC_CONFIG=/etc/hstlc.toml cargo run --bin hstlc-ingest
//! ```
//!
//! Reads `ingest_dir`, `outputs_dir` and `composite_dir` from the
//! `[pipeline]` section. `RUST_LOG` sets the log level (default: info).

use std::env;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use hstlc::algorithms::{Calibration, HeaderCalibration};
use hstlc::config::PipelineConfig;
use hstlc::db::CatalogSource;
use hstlc::services::{ingest_directory, run_composites, CompositeSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let config = PipelineConfig::load().context("Failed to load pipeline configuration")?;
    let repository = CatalogSource::resolve()
        .and_then(CatalogSource::open)
        .context("Failed to initialize catalog")?;
    let calibration: Arc<dyn Calibration> = Arc::new(HeaderCalibration);

    let ingested = ingest_directory(repository.as_ref(), &config, Arc::clone(&calibration))
        .await
        .with_context(|| format!("Failed to ingest {}", config.ingest_dir.display()))?;
    info!(
        ingested = ingested.ingested,
        rejected = ingested.rejected,
        failed = ingested.failed,
        "Ingest finished"
    );

    let composites = run_composites(repository, &CompositeSettings::from(&config), calibration)
        .await
        .context("Failed to list pending datasets")?;
    info!(
        done = composites.done,
        failed = composites.failed,
        "Composites finished"
    );
    Ok(())
}
