//! Clear every catalog table.
//!
//! # Usage
//!
//! ```bash
//! HSTLC_CONFIG=/etc/hstlc.toml cargo run --bin hstlc-reset
//! ```
//!
//! Lightcurve files on disk are left in place.

use std::env;

use anyhow::Context;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use hstlc::db::{CatalogSource, ExposureRepository};

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
        .init();

    let repository = CatalogSource::resolve()
        .and_then(CatalogSource::open)
        .context("Failed to initialize catalog")?;
    repository.reset().await.context("Failed to reset catalog")?;
    info!("Catalog reset");
    Ok(())
}
