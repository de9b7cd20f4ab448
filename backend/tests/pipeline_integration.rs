//! End-to-end tests of the composite reprocessing driver over the local catalog.

mod support;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use hstlc::algorithms::HeaderCalibration;
use hstlc::api::{
    BadDataRecord, DatasetKey, Exposure, ExposureId, GroupMember, Instrument, ObsType,
    OutputRecord, StatsRecord,
};
use hstlc::db::{
    BadDataRepository, ExposureRepository, FullRepository, LocalRepository, RepositoryError,
    RepositoryResult, StatsRepository,
};
use hstlc::models::read_lightcurve;
use hstlc::services::{run_composites, CompositeSettings, GroupState};

const COMPOSITE: &str = "hlsp_hstlc_hst_cos-fuv_hd12345_g130m_1300_psa_v1_sci.json";

fn exposure(dir: &Path, filename: &str, targname: &str, cenwave: i32) -> Exposure {
    Exposure {
        id: None,
        filename: filename.to_string(),
        path: dir.display().to_string(),
        telescope: "HST".to_string(),
        instrument: Instrument::Cos,
        detector: "FUV".to_string(),
        targname: targname.to_string(),
        cal_ver: "3.4.0".to_string(),
        obstype: ObsType::Spectroscopic,
        cenwave,
        opt_elem: "G130M".to_string(),
        aperture: "PSA".to_string(),
        fppos: 3,
        ingest_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
    }
}

async fn register(repo: &LocalRepository, exposure: Exposure) -> ExposureId {
    let stored = repo.upsert_exposure(&exposure).await.unwrap();
    let id = stored.id.unwrap();
    repo.upsert_output(&OutputRecord {
        id: None,
        exposure_id: id,
        individual_path: "outputs/HD12345".to_string(),
        individual_filename: format!("{}_curve.json", id),
        composite_path: None,
        composite_filename: None,
    })
    .await
    .unwrap();
    id
}

/// Local catalog whose final per-group write always fails.
struct FailingCompletion {
    inner: LocalRepository,
}

#[async_trait]
impl ExposureRepository for FailingCompletion {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.inner.health_check().await
    }

    async fn upsert_exposure(&self, exposure: &Exposure) -> RepositoryResult<Exposure> {
        self.inner.upsert_exposure(exposure).await
    }

    async fn get_exposure_by_filename(
        &self,
        filename: &str,
    ) -> RepositoryResult<Option<Exposure>> {
        self.inner.get_exposure_by_filename(filename).await
    }

    async fn list_exposures(&self) -> RepositoryResult<Vec<Exposure>> {
        self.inner.list_exposures().await
    }

    async fn upsert_output(&self, output: &OutputRecord) -> RepositoryResult<OutputRecord> {
        self.inner.upsert_output(output).await
    }

    async fn get_output(&self, exposure_id: ExposureId) -> RepositoryResult<Option<OutputRecord>> {
        self.inner.get_output(exposure_id).await
    }

    async fn list_outputs(&self) -> RepositoryResult<Vec<OutputRecord>> {
        self.inner.list_outputs().await
    }

    async fn list_pending_groups(&self) -> RepositoryResult<Vec<DatasetKey>> {
        self.inner.list_pending_groups().await
    }

    async fn list_group_members(&self, key: &DatasetKey) -> RepositoryResult<Vec<GroupMember>> {
        self.inner.list_group_members(key).await
    }

    async fn complete_composite(
        &self,
        _exposure_ids: &[ExposureId],
        _composite_path: &str,
        _composite_filename: &str,
        _stats: &StatsRecord,
    ) -> RepositoryResult<usize> {
        Err(RepositoryError::connection("connection reset"))
    }

    async fn reset(&self) -> RepositoryResult<()> {
        self.inner.reset().await
    }
}

#[async_trait]
impl BadDataRepository for FailingCompletion {
    async fn record_bad_data(&self, record: &BadDataRecord) -> RepositoryResult<BadDataRecord> {
        self.inner.record_bad_data(record).await
    }

    async fn list_bad_data(&self) -> RepositoryResult<Vec<BadDataRecord>> {
        self.inner.list_bad_data().await
    }
}

#[async_trait]
impl StatsRepository for FailingCompletion {
    async fn upsert_stats(&self, stats: &StatsRecord) -> RepositoryResult<StatsRecord> {
        self.inner.upsert_stats(stats).await
    }

    async fn get_stats(&self, lightcurve_filename: &str) -> RepositoryResult<Option<StatsRecord>> {
        self.inner.get_stats(lightcurve_filename).await
    }

    async fn list_stats(&self) -> RepositoryResult<Vec<StatsRecord>> {
        self.inner.list_stats().await
    }
}

fn settings(dir: &Path) -> CompositeSettings {
    CompositeSettings {
        composite_dir: dir.join("composites"),
        step: qtty::Seconds::new(2.0),
        num_workers: 2,
    }
}

#[tokio::test]
async fn test_two_exposures_resolve_common_range_and_tag_rows() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(LocalRepository::new());

    support::write_json(
        dir.path(),
        "la1_corrtag_a.json",
        &support::cos_exposure(&support::wavelength_span(900.0, 1800.0, 20), 20.0),
    );
    support::write_json(
        dir.path(),
        "la2_corrtag_a.json",
        &support::cos_exposure(&support::wavelength_span(1000.0, 2000.0, 20), 20.0),
    );
    register(&repo, exposure(dir.path(), "la1_corrtag_a.json", "HD12345", 1300)).await;
    register(&repo, exposure(dir.path(), "la2_corrtag_a.json", "HD12345", 1300)).await;

    let catalog: Arc<dyn FullRepository> = repo.clone();
    let summary = run_composites(catalog, &settings(dir.path()), Arc::new(HeaderCalibration))
        .await
        .unwrap();
    assert_eq!((summary.pending, summary.done, summary.failed), (1, 1, 0));

    let curve = read_lightcurve(dir.path().join("composites").join(COMPOSITE)).unwrap();
    assert_eq!(curve.header.min_wavelength, 1000.0);
    assert_eq!(curve.header.max_wavelength, 1800.0);
    assert_eq!(curve.header.members, ["la1_corrtag_a.json", "la2_corrtag_a.json"]);

    // 20 s at a 2 s step: ten bins per exposure
    assert_eq!(curve.rows.len(), 20);
    assert!(curve.rows[..10]
        .iter()
        .all(|r| r.dataset.as_deref() == Some("la1_corrtag_a.json")));
    assert!(curve.rows[10..]
        .iter()
        .all(|r| r.dataset.as_deref() == Some("la2_corrtag_a.json")));

    // Events outside [1000, 1800] are dropped from each member
    let gross: u64 = curve.rows.iter().map(|r| r.gross).sum();
    assert!(gross < 40);
    assert!(gross > 0);

    for output in repo.list_outputs().await.unwrap() {
        assert_eq!(output.composite_filename.as_deref(), Some(COMPOSITE));
    }
    assert!(repo.list_pending_groups().await.unwrap().is_empty());

    let stats = repo.get_stats(COMPOSITE).await.unwrap().unwrap();
    assert_eq!(stats.total, gross as i64);
    assert!(!stats.deliver);
}

#[tokio::test]
async fn test_corrupt_member_is_excluded() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(LocalRepository::new());

    let names = [
        "m1_corrtag_a.json",
        "m2_corrtag_a.json",
        "m3_corrtag_a.json",
        "m4_corrtag_a.json",
        "m5_corrtag_a.json",
    ];
    for (i, name) in names.iter().enumerate() {
        if i == 2 {
            std::fs::write(dir.path().join(name), "{\"header\": ").unwrap();
        } else {
            support::write_json(
                dir.path(),
                name,
                &support::cos_exposure(&support::wavelength_span(1100.0, 1700.0, 8), 8.0),
            );
        }
        register(&repo, exposure(dir.path(), name, "HD12345", 1300)).await;
    }

    let catalog: Arc<dyn FullRepository> = repo.clone();
    let summary = run_composites(catalog, &settings(dir.path()), Arc::new(HeaderCalibration))
        .await
        .unwrap();
    assert_eq!(summary.done, 1);

    let report = &summary.reports[0];
    assert_eq!(report.state, GroupState::Done);
    assert_eq!(report.included, 4);
    assert_eq!(report.excluded, ["m3_corrtag_a.json"]);

    let curve = read_lightcurve(dir.path().join("composites").join(COMPOSITE)).unwrap();
    assert_eq!(
        curve.header.members,
        ["m1_corrtag_a.json", "m2_corrtag_a.json", "m4_corrtag_a.json", "m5_corrtag_a.json"]
    );
    let tagged: BTreeSet<_> = curve
        .rows
        .iter()
        .filter_map(|r| r.dataset.clone())
        .collect();
    assert!(!tagged.contains("m3_corrtag_a.json"));
    assert_eq!(tagged.len(), 4);
}

#[tokio::test]
async fn test_failed_group_stays_pending() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(LocalRepository::new());

    support::write_json(
        dir.path(),
        "ok_corrtag_a.json",
        &support::cos_exposure(&support::wavelength_span(1100.0, 1700.0, 8), 8.0),
    );
    std::fs::write(dir.path().join("bad_corrtag_a.json"), "not json").unwrap();
    register(&repo, exposure(dir.path(), "ok_corrtag_a.json", "HD12345", 1300)).await;
    let bad = register(&repo, exposure(dir.path(), "bad_corrtag_a.json", "GD71", 1291)).await;

    let catalog: Arc<dyn FullRepository> = repo.clone();
    let summary = run_composites(catalog, &settings(dir.path()), Arc::new(HeaderCalibration))
        .await
        .unwrap();
    assert_eq!((summary.done, summary.failed), (1, 1));

    let pending = repo.list_pending_groups().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].targname, "GD71");
    assert!(repo.get_output(bad).await.unwrap().unwrap().is_pending());
    assert!(repo.list_stats().await.unwrap().len() == 1);
}

#[tokio::test]
async fn test_pending_groups_partition_exposures() {
    let dir = tempfile::tempdir().unwrap();
    let repo = LocalRepository::new();

    let layout = [
        ("a1_tag.json", "HD12345", 1300),
        ("a2_tag.json", "HD12345", 1300),
        ("b1_tag.json", "HD12345", 1291),
        ("c1_tag.json", "GD71", 1300),
        ("c2_tag.json", "GD71", 1300),
        ("c3_tag.json", "GD71", 1300),
    ];
    let mut all_ids = BTreeSet::new();
    for (name, target, cenwave) in layout {
        all_ids.insert(register(&repo, exposure(dir.path(), name, target, cenwave)).await);
    }

    let groups = repo.list_pending_groups().await.unwrap();
    assert_eq!(groups.len(), 3);

    let mut seen = BTreeSet::new();
    for key in &groups {
        for member in repo.list_group_members(key).await.unwrap() {
            assert!(seen.insert(member.id), "exposure {} in two groups", member.id);
            let exposure = repo
                .get_exposure_by_filename(&member.filename)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&exposure.dataset_key(), key);
        }
    }
    assert_eq!(seen, all_ids);
}

#[tokio::test]
async fn test_no_pending_groups_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let catalog: Arc<dyn FullRepository> = Arc::new(LocalRepository::new());
    let summary = run_composites(catalog, &settings(dir.path()), Arc::new(HeaderCalibration))
        .await
        .unwrap();
    assert_eq!((summary.pending, summary.done, summary.failed), (0, 0, 0));
    assert!(!dir.path().join("composites").exists());
}

#[tokio::test]
async fn test_failed_catalog_write_leaves_no_stats() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(FailingCompletion {
        inner: LocalRepository::new(),
    });

    support::write_json(
        dir.path(),
        "w1_corrtag_a.json",
        &support::cos_exposure(&support::wavelength_span(1100.0, 1700.0, 8), 8.0),
    );
    let id = register(&repo.inner, exposure(dir.path(), "w1_corrtag_a.json", "HD12345", 1300)).await;

    let catalog: Arc<dyn FullRepository> = repo.clone();
    let summary = run_composites(catalog, &settings(dir.path()), Arc::new(HeaderCalibration))
        .await
        .unwrap();
    assert_eq!((summary.done, summary.failed), (0, 1));

    assert!(repo.inner.list_stats().await.unwrap().is_empty());
    assert!(repo.inner.get_output(id).await.unwrap().unwrap().is_pending());
    assert_eq!(repo.inner.list_pending_groups().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_exposure_without_output_does_not_fail_group() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(LocalRepository::new());

    support::write_json(
        dir.path(),
        "o1_corrtag_a.json",
        &support::cos_exposure(&support::wavelength_span(1100.0, 1700.0, 8), 8.0),
    );
    register(&repo, exposure(dir.path(), "o1_corrtag_a.json", "HD12345", 1300)).await;
    // Catalogued, but its individual product was never registered
    repo.upsert_exposure(&exposure(dir.path(), "o2_corrtag_a.json", "HD12345", 1300))
        .await
        .unwrap();

    let catalog: Arc<dyn FullRepository> = repo.clone();
    let summary = run_composites(catalog, &settings(dir.path()), Arc::new(HeaderCalibration))
        .await
        .unwrap();
    assert_eq!((summary.done, summary.failed), (1, 0));
    assert_eq!(summary.reports[0].included, 1);
    assert!(repo.list_pending_groups().await.unwrap().is_empty());
}
