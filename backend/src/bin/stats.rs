//! Recompute the stats table.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin hstlc-stats -- individual
//! cargo run --bin hstlc-stats -- composite
//! cargo run --bin hstlc-stats -- both
//! ```

use std::env;

use anyhow::Context;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use hstlc::api::ProductType;
use hstlc::config::PipelineConfig;
use hstlc::db::CatalogSource;
use hstlc::services::build_stats_table;

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

    let product: ProductType = env::args()
        .nth(1)
        .context("Usage: hstlc-stats <individual|composite|both>")?
        .parse()
        .map_err(anyhow::Error::msg)?;

    let config = PipelineConfig::load().context("Failed to load pipeline configuration")?;
    let repository = CatalogSource::resolve()
        .and_then(CatalogSource::open)
        .context("Failed to initialize catalog")?;

    let summary = build_stats_table(repository.as_ref(), product, config.num_workers)
        .await
        .context("Failed to build stats table")?;
    info!(updated = summary.updated, failed = summary.failed, "Finished");
    Ok(())
}
