//! Composite reprocessing driver.
//!
//! Every dataset group with at least one exposure lacking a composite is
//! rebuilt on a bounded worker pool. A group moves
//! pending → processing → done | failed; a failed group is logged and left
//! pending for the next run.

use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::algorithms::binning::Calibration;
use crate::api::{DatasetKey, StatsRecord};
use crate::config::PipelineConfig;
use crate::db::repository::{ExposureRepository, FullRepository, RepositoryError};
use crate::models::{write_lightcurve, LightCurveError};
use crate::services::composite::{build_composite, CompositeError};
use crate::services::stats_table::stats_record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Pending,
    Processing,
    Done,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Catalog operation failed")]
    Catalog(#[from] RepositoryError),

    #[error("Composite build failed")]
    Composite(#[from] CompositeError),

    #[error("Failed to write composite")]
    Write(#[from] LightCurveError),

    #[error("Worker task failed: {0}")]
    Task(String),
}

/// What happened to one group.
#[derive(Debug, Clone)]
pub struct GroupReport {
    pub key: DatasetKey,
    pub state: GroupState,
    pub composite: Option<PathBuf>,
    pub included: usize,
    pub excluded: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub pending: usize,
    pub done: usize,
    pub failed: usize,
    pub reports: Vec<GroupReport>,
}

/// Settings the workers need, detached from the full configuration.
#[derive(Debug, Clone)]
pub struct CompositeSettings {
    pub composite_dir: PathBuf,
    pub step: qtty::Seconds,
    pub num_workers: usize,
}

impl From<&PipelineConfig> for CompositeSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            composite_dir: config.composite_dir.clone(),
            step: config.composite_step(),
            num_workers: config.num_workers,
        }
    }
}

/// Build, write and register the composite of one group.
///
/// The catalog is written only after the file is on disk, and then in one
/// batch: every member's output record together with the stats row.
pub async fn process_group<R: FullRepository + ?Sized>(
    repo: &R,
    key: DatasetKey,
    settings: &CompositeSettings,
    calibration: Arc<dyn Calibration>,
) -> Result<GroupReport, PipelineError> {
    let members = repo.list_group_members(&key).await?;
    let member_ids: Vec<_> = members.iter().map(|m| m.id).collect();
    let filename = key.composite_filename();
    let output = settings.composite_dir.join(&filename);

    let (build, stats): (_, StatsRecord) = tokio::task::spawn_blocking({
        let key = key.clone();
        let output = output.clone();
        let step = settings.step;
        move || -> Result<_, PipelineError> {
            let build = build_composite(&key, &members, step, calibration.as_ref())?;
            write_lightcurve(&output, &build.curve)?;
            let stats = stats_record(&output, &build.curve);
            Ok((build, stats))
        }
    })
    .await
    .map_err(|e| PipelineError::Task(e.to_string()))??;

    let composite_path = settings.composite_dir.display().to_string();
    let updated = repo
        .complete_composite(&member_ids, &composite_path, &filename, &stats)
        .await?;

    info!(
        dataset = %key,
        state = ?GroupState::Done,
        output = %output.display(),
        members = updated,
        excluded = build.excluded.len(),
        interesting = stats.periodogram,
        "Composite complete"
    );

    Ok(GroupReport {
        key,
        state: GroupState::Done,
        composite: Some(output),
        included: build.included.len(),
        excluded: build.excluded,
    })
}

/// Render an error and its sources as `outer: inner: ...`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

/// Rebuild every pending group with `settings.num_workers` concurrent workers.
///
/// Fails only when the pending groups cannot be listed; group failures are
/// logged and counted.
pub async fn run_composites(
    repo: Arc<dyn FullRepository>,
    settings: &CompositeSettings,
    calibration: Arc<dyn Calibration>,
) -> Result<PipelineSummary, PipelineError> {
    let pending = repo.list_pending_groups().await?;
    for key in &pending {
        debug!(dataset = %key, state = ?GroupState::Pending, "Queued dataset");
    }
    info!(
        groups = pending.len(),
        workers = settings.num_workers,
        "Processing pending datasets"
    );

    let reports: Vec<GroupReport> = stream::iter(pending.clone())
        .map(|key| {
            let repo = Arc::clone(&repo);
            let calibration = Arc::clone(&calibration);
            async move {
                info!(dataset = %key, state = ?GroupState::Processing, "Processing dataset");
                match process_group(repo.as_ref(), key.clone(), settings, calibration).await {
                    Ok(report) => report,
                    Err(e) => {
                        error!(
                            dataset = %key,
                            state = ?GroupState::Failed,
                            error = %error_chain(&e),
                            "Dataset failed"
                        );
                        GroupReport {
                            key,
                            state: GroupState::Failed,
                            composite: None,
                            included: 0,
                            excluded: Vec::new(),
                        }
                    }
                }
            }
        })
        .buffer_unordered(settings.num_workers.max(1))
        .collect()
        .await;

    let done = reports.iter().filter(|r| r.state == GroupState::Done).count();
    let failed = reports.len() - done;
    if failed > 0 {
        warn!(failed, "Some datasets failed and remain pending");
    }
    info!(done, failed, "Composite run complete");

    Ok(PipelineSummary {
        pending: pending.len(),
        done,
        failed,
        reports,
    })
}
