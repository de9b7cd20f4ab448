//! Statistics of lightcurve products and the `stats` table.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::algorithms::periodogram::is_interesting;
use crate::algorithms::statistics::{compute_stats, CountStats};
use crate::api::{ProductType, StatsRecord};
use crate::db::repository::{FullRepository, RepositoryError};
use crate::models::{read_lightcurve, LightCurve, LightCurveError};

/// Count statistics over gross counts and the periodogram flag over net counts.
///
/// A lightcurve with no counts is never flagged.
pub fn compute_lightcurve_stats(curve: &LightCurve) -> (CountStats, bool) {
    let mjd = curve.mjd();
    let stats = compute_stats(&curve.gross(), &mjd);
    let periodogram = stats.total > 0 && is_interesting(&mjd, &curve.net(), curve.header.step);
    (stats, periodogram)
}

/// Stats row for the lightcurve at `path`. `deliver` is left false; the
/// catalog keeps any curated value on update.
pub fn stats_record(path: &Path, curve: &LightCurve) -> StatsRecord {
    let (stats, periodogram) = compute_lightcurve_stats(curve);
    let lightcurve_path = path
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let lightcurve_filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    StatsRecord {
        id: None,
        lightcurve_path,
        lightcurve_filename,
        total: stats.total,
        mean: stats.mean,
        mu: stats.mu,
        stdev: stats.stdev,
        poisson_factor: stats.poisson_factor,
        pearson_r: stats.pearson_r,
        pearson_p: stats.pearson_p,
        periodogram,
        deliver: false,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatsTableError {
    #[error(transparent)]
    Catalog(#[from] RepositoryError),

    #[error(transparent)]
    LightCurve(#[from] LightCurveError),

    #[error("Statistics task failed: {0}")]
    Task(String),
}

/// Read a lightcurve and compute its stats row off the async runtime.
pub async fn lightcurve_stats(path: PathBuf) -> Result<StatsRecord, StatsTableError> {
    tokio::task::spawn_blocking(move || {
        let curve = read_lightcurve(&path)?;
        Ok(stats_record(&path, &curve))
    })
    .await
    .map_err(|e| StatsTableError::Task(e.to_string()))?
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsTableSummary {
    pub updated: usize,
    pub failed: usize,
}

/// Lightcurve files of the requested product type listed in the outputs table.
pub async fn product_paths<R: FullRepository + ?Sized>(
    repo: &R,
    product: ProductType,
) -> Result<Vec<PathBuf>, StatsTableError> {
    let outputs = repo.list_outputs().await?;
    let mut paths = BTreeSet::new();
    for output in outputs {
        if matches!(product, ProductType::Individual | ProductType::Both) {
            paths.insert(output.individual_lightcurve());
        }
        if matches!(product, ProductType::Composite | ProductType::Both) {
            if let Some(composite) = output.composite_lightcurve() {
                paths.insert(composite);
            }
        }
    }
    Ok(paths.into_iter().collect())
}

/// Recompute and upsert stats for every product of `product` type.
///
/// Unreadable lightcurves are logged and counted as failed.
pub async fn build_stats_table<R: FullRepository + ?Sized>(
    repo: &R,
    product: ProductType,
    num_workers: usize,
) -> Result<StatsTableSummary, StatsTableError> {
    let paths = product_paths(repo, product).await?;
    info!(count = paths.len(), ?product, "Building stats table");

    let results: Vec<(PathBuf, Result<StatsRecord, StatsTableError>)> = stream::iter(paths)
        .map(|path| async move {
            let result = lightcurve_stats(path.clone()).await;
            (path, result)
        })
        .buffer_unordered(num_workers.max(1))
        .collect()
        .await;

    let mut summary = StatsTableSummary::default();
    for (path, result) in results {
        match result {
            Ok(record) => {
                repo.upsert_stats(&record).await?;
                debug!(file = %path.display(), total = record.total, "Updated stats");
                summary.updated += 1;
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping lightcurve");
                summary.failed += 1;
            }
        }
    }

    info!(updated = summary.updated, failed = summary.failed, "Stats table complete");
    Ok(summary)
}
