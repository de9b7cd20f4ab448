//! Ingest of new event files into the catalog.
//!
//! For every `*tag*.json` file in the ingest directory: run the data-quality
//! gate, record the exposure, build its individual lightcurve and register
//! the product and its statistics. Files stay where they are.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::algorithms::binning::Calibration;
use crate::api::{BadDataReason, BadDataRecord, Exposure, ExposureId, Instrument, ObsType, OutputRecord};
use crate::config::PipelineConfig;
use crate::db::repository::{FullRepository, RepositoryError};
use crate::models::{companion_path, read_event_file, read_lightcurve, EventFileError, ExposureHeader, LightCurveError};
use crate::services::composite::{make_individual, CompositeError, IndividualProduct};
use crate::services::data_checks::{dataset_ok, CheckSettings};
use crate::services::pipeline::error_chain;
use crate::services::stats_table::stats_record;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Failed to list ingest directory {path}: {source}")]
    Listing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid header in {file}: {message}")]
    Header { file: String, message: String },

    #[error(transparent)]
    EventFile(#[from] EventFileError),

    #[error(transparent)]
    Product(#[from] CompositeError),

    #[error(transparent)]
    LightCurve(#[from] LightCurveError),

    #[error("Catalog operation failed")]
    Catalog(#[from] RepositoryError),

    #[error("Ingest task failed: {0}")]
    Task(String),
}

/// Event files waiting in `ingest_dir`, sorted by name.
///
/// A `_corrtag_b` file is dropped when its `_corrtag_a` companion is also
/// present, since the merger reads both halves through the `_a` file.
pub fn gather_files(ingest_dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let listing_err = |source| IngestError::Listing {
        path: ingest_dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(ingest_dir).map_err(listing_err)? {
        let path = entry.map_err(listing_err)?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && name.contains("tag") && name.ends_with(".json") {
            files.push(path);
        }
    }
    files.sort();

    let (keep, dropped): (Vec<_>, Vec<_>) = files.into_iter().partition(|path| {
        let is_segment_b = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains("_corrtag_b"));
        !(is_segment_b && companion_path(path).is_some_and(|a| a.exists()))
    });
    for path in &dropped {
        debug!(file = %path.display(), "Segment B is read through its segment A companion");
    }
    Ok(keep)
}

/// Catalog record for an exposure, normalizing fields that do not apply:
/// cenwave is 0 for imaging and fppos is 0 for STIS.
pub fn exposure_from_header(
    path: &Path,
    header: &ExposureHeader,
    ingest_date: NaiveDate,
) -> Result<Exposure, IngestError> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let header_err = |message: String| IngestError::Header {
        file: filename.clone(),
        message,
    };

    let instrument = header.instrument.parse::<Instrument>().map_err(header_err)?;
    let obstype = header.obstype.parse::<ObsType>().map_err(header_err)?;
    let cenwave = match obstype {
        ObsType::Spectroscopic => header.cenwave,
        ObsType::Imaging => 0,
    };
    let fppos = match instrument {
        Instrument::Cos => header.fppos,
        Instrument::Stis => 0,
    };

    Ok(Exposure {
        id: None,
        filename: filename.clone(),
        path: path
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        telescope: header.telescope.clone(),
        instrument,
        detector: header.detector.clone(),
        targname: header.targname.clone(),
        cal_ver: header.cal_ver.clone(),
        obstype,
        cenwave,
        opt_elem: header.opt_elem.clone(),
        aperture: header.aperture.clone(),
        fppos,
        ingest_date,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Ingested {
        exposure_id: ExposureId,
        individual: IndividualProduct,
    },
    Rejected(BadDataReason),
}

/// Ingest one event file.
pub async fn ingest_file<R: FullRepository + ?Sized>(
    repo: &R,
    path: &Path,
    config: &PipelineConfig,
    calibration: Arc<dyn Calibration>,
) -> Result<IngestOutcome, IngestError> {
    let today = Utc::now().date_naive();
    let checks: CheckSettings = config.check_settings();

    let file = tokio::task::spawn_blocking({
        let path = path.to_path_buf();
        move || read_event_file(path)
    })
    .await
    .map_err(|e| IngestError::Task(e.to_string()))??;

    let exposure = exposure_from_header(path, &file.header, today)?;
    if let Err(reason) = dataset_ok(&file, &checks) {
        info!(file = %exposure.filename, %reason, "Bad data");
        repo.record_bad_data(&BadDataRecord {
            id: None,
            filename: exposure.filename.clone(),
            ingest_date: today,
            reason,
        })
        .await?;
        return Ok(IngestOutcome::Rejected(reason));
    }

    // No catalog write until the individual product exists
    let (individual, stats) = tokio::task::spawn_blocking({
        let path = path.to_path_buf();
        let outputs_dir = config.outputs_dir.clone();
        let step = config.individual_step();
        move || -> Result<_, IngestError> {
            let individual = make_individual(&path, &outputs_dir, step, calibration.as_ref())?;
            let curve = read_lightcurve(individual.full_path())?;
            let stats = stats_record(&individual.full_path(), &curve);
            Ok((individual, stats))
        }
    })
    .await
    .map_err(|e| IngestError::Task(e.to_string()))??;

    let stored = repo.upsert_exposure(&exposure).await?;
    let exposure_id = stored.id.ok_or_else(|| {
        RepositoryError::internal(format!("Catalog returned no id for {}", stored.filename))
    })?;

    // A fresh output record has no composite, which queues the group
    repo.upsert_output(&OutputRecord {
        id: None,
        exposure_id,
        individual_path: individual.path.display().to_string(),
        individual_filename: individual.filename.clone(),
        composite_path: None,
        composite_filename: None,
    })
    .await?;
    repo.upsert_stats(&stats).await?;

    info!(
        file = %stored.filename,
        dataset = %stored.dataset_key(),
        created = individual.created,
        "Ingested"
    );
    Ok(IngestOutcome::Ingested {
        exposure_id,
        individual,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub ingested: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// Ingest every file in `config.ingest_dir`.
///
/// Per-file failures are logged and counted; only an unreadable ingest
/// directory fails the run.
pub async fn ingest_directory<R: FullRepository + ?Sized>(
    repo: &R,
    config: &PipelineConfig,
    calibration: Arc<dyn Calibration>,
) -> Result<IngestSummary, IngestError> {
    let files = gather_files(&config.ingest_dir)?;
    info!(
        count = files.len(),
        workers = config.num_workers,
        dir = %config.ingest_dir.display(),
        "Ingesting files"
    );

    let outcomes: Vec<(PathBuf, Result<IngestOutcome, IngestError>)> = stream::iter(files)
        .map(|path| {
            let calibration = Arc::clone(&calibration);
            async move {
                let outcome = ingest_file(repo, &path, config, calibration).await;
                (path, outcome)
            }
        })
        .buffer_unordered(config.num_workers.max(1))
        .collect()
        .await;

    let mut summary = IngestSummary::default();
    for (path, outcome) in outcomes {
        match outcome {
            Ok(IngestOutcome::Ingested { .. }) => summary.ingested += 1,
            Ok(IngestOutcome::Rejected(_)) => summary.rejected += 1,
            Err(e) => {
                warn!(file = %path.display(), error = %error_chain(&e), "Ingest failed");
                summary.failed += 1;
            }
        }
    }

    info!(
        ingested = summary.ingested,
        rejected = summary.rejected,
        failed = summary.failed,
        "Ingest complete"
    );
    Ok(summary)
}
