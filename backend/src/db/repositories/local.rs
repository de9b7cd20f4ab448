//! In-memory catalog.
//!
//! Suitable for unit tests and local runs. Every table is a `BTreeMap`, so
//! listings come back in a stable order without extra sorting.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use crate::api::*;
use crate::db::repository::*;

/// In-memory catalog shared between clones.
///
/// # Example
/// ```
/// use hstlc::db::repositories::LocalRepository;
/// use hstlc::db::ExposureRepository;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let repo = LocalRepository::new();
/// assert!(repo.health_check().await.unwrap());
/// assert!(repo.list_pending_groups().await.unwrap().is_empty());
/// # });
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct LocalData {
    exposures: BTreeMap<ExposureId, Exposure>,
    exposure_ids: BTreeMap<String, ExposureId>,
    outputs: BTreeMap<ExposureId, OutputRecord>,
    bad_data: BTreeMap<String, BadDataRecord>,
    stats: BTreeMap<String, StatsRecord>,

    next_exposure_id: i64,
    next_output_id: i64,
    next_bad_data_id: i64,
    next_stats_id: i64,

    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            exposures: BTreeMap::new(),
            exposure_ids: BTreeMap::new(),
            outputs: BTreeMap::new(),
            bad_data: BTreeMap::new(),
            stats: BTreeMap::new(),
            next_exposure_id: 1,
            next_output_id: 1,
            next_bad_data_id: 1,
            next_stats_id: 1,
            is_healthy: true,
        }
    }
}

impl LocalData {
    /// Upsert keyed by lightcurve filename, keeping the stored `deliver` flag.
    fn store_stats(&mut self, stats: &StatsRecord) -> StatsRecord {
        let mut stored = stats.clone();
        match self.stats.get(&stats.lightcurve_filename) {
            Some(existing) => {
                stored.id = existing.id;
                stored.deliver = existing.deliver;
            }
            None => {
                stored.id = Some(StatsId(self.next_stats_id));
                self.next_stats_id += 1;
            }
        }
        self.stats
            .insert(stats.lightcurve_filename.clone(), stored.clone());
        stored
    }
}

impl LocalRepository {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Clear all tables, keeping the health status.
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = LocalData {
            is_healthy: data.is_healthy,
            ..Default::default()
        };
    }

    pub fn exposure_count(&self) -> usize {
        self.data.read().exposures.len()
    }

    fn check_health(&self) -> RepositoryResult<()> {
        if !self.data.read().is_healthy {
            return Err(RepositoryError::connection("Catalog is not healthy"));
        }
        Ok(())
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExposureRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn upsert_exposure(&self, exposure: &Exposure) -> RepositoryResult<Exposure> {
        self.check_health()?;
        let mut data = self.data.write();

        let id = match data.exposure_ids.get(&exposure.filename) {
            Some(id) => *id,
            None => {
                let id = ExposureId(data.next_exposure_id);
                data.next_exposure_id += 1;
                data.exposure_ids.insert(exposure.filename.clone(), id);
                id
            }
        };

        let mut stored = exposure.clone();
        stored.id = Some(id);
        data.exposures.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_exposure_by_filename(
        &self,
        filename: &str,
    ) -> RepositoryResult<Option<Exposure>> {
        self.check_health()?;
        let data = self.data.read();
        Ok(data
            .exposure_ids
            .get(filename)
            .and_then(|id| data.exposures.get(id))
            .cloned())
    }

    async fn list_exposures(&self) -> RepositoryResult<Vec<Exposure>> {
        self.check_health()?;
        Ok(self.data.read().exposures.values().cloned().collect())
    }

    async fn upsert_output(&self, output: &OutputRecord) -> RepositoryResult<OutputRecord> {
        self.check_health()?;
        let mut data = self.data.write();

        if !data.exposures.contains_key(&output.exposure_id) {
            return Err(RepositoryError::validation("Output refers to an unknown exposure")
                .at(ErrorContext::new("upsert_output").row("outputs", output.exposure_id)));
        }

        let id = match data.outputs.get(&output.exposure_id).and_then(|o| o.id) {
            Some(id) => id,
            None => {
                let id = OutputId(data.next_output_id);
                data.next_output_id += 1;
                id
            }
        };

        let mut stored = output.clone();
        stored.id = Some(id);
        data.outputs.insert(output.exposure_id, stored.clone());
        Ok(stored)
    }

    async fn get_output(&self, exposure_id: ExposureId) -> RepositoryResult<Option<OutputRecord>> {
        self.check_health()?;
        Ok(self.data.read().outputs.get(&exposure_id).cloned())
    }

    async fn list_outputs(&self) -> RepositoryResult<Vec<OutputRecord>> {
        self.check_health()?;
        Ok(self.data.read().outputs.values().cloned().collect())
    }

    async fn list_pending_groups(&self) -> RepositoryResult<Vec<DatasetKey>> {
        self.check_health()?;
        let data = self.data.read();
        let pending: BTreeSet<DatasetKey> = data
            .outputs
            .values()
            .filter(|o| o.is_pending())
            .filter_map(|o| data.exposures.get(&o.exposure_id))
            .map(Exposure::dataset_key)
            .collect();
        Ok(pending.into_iter().collect())
    }

    async fn list_group_members(&self, key: &DatasetKey) -> RepositoryResult<Vec<GroupMember>> {
        self.check_health()?;
        let data = self.data.read();
        Ok(data
            .exposures
            .values()
            .filter(|e| &e.dataset_key() == key)
            .filter(|e| e.id.is_some_and(|id| data.outputs.contains_key(&id)))
            .filter_map(|e| {
                e.id.map(|id| GroupMember {
                    id,
                    path: e.path.clone(),
                    filename: e.filename.clone(),
                })
            })
            .collect())
    }

    async fn complete_composite(
        &self,
        exposure_ids: &[ExposureId],
        composite_path: &str,
        composite_filename: &str,
        stats: &StatsRecord,
    ) -> RepositoryResult<usize> {
        self.check_health()?;
        // One write lock for the whole batch so readers never see a partial update
        let mut data = self.data.write();

        let wanted: HashSet<ExposureId> = exposure_ids.iter().copied().collect();
        if let Some(missing) = wanted.iter().find(|id| !data.outputs.contains_key(*id)) {
            return Err(RepositoryError::not_found("No output record for exposure")
                .at(ErrorContext::new("complete_composite").row("outputs", missing)));
        }

        for id in &wanted {
            if let Some(output) = data.outputs.get_mut(id) {
                output.composite_path = Some(composite_path.to_string());
                output.composite_filename = Some(composite_filename.to_string());
            }
        }
        data.store_stats(stats);
        Ok(wanted.len())
    }

    async fn reset(&self) -> RepositoryResult<()> {
        self.check_health()?;
        self.clear();
        Ok(())
    }
}

#[async_trait]
impl BadDataRepository for LocalRepository {
    async fn record_bad_data(&self, record: &BadDataRecord) -> RepositoryResult<BadDataRecord> {
        self.check_health()?;
        let mut data = self.data.write();

        let id = match data.bad_data.get(&record.filename).and_then(|r| r.id) {
            Some(id) => id,
            None => {
                let id = BadDataId(data.next_bad_data_id);
                data.next_bad_data_id += 1;
                id
            }
        };

        let mut stored = record.clone();
        stored.id = Some(id);
        data.bad_data.insert(record.filename.clone(), stored.clone());
        Ok(stored)
    }

    async fn list_bad_data(&self) -> RepositoryResult<Vec<BadDataRecord>> {
        self.check_health()?;
        Ok(self.data.read().bad_data.values().cloned().collect())
    }
}

#[async_trait]
impl StatsRepository for LocalRepository {
    async fn upsert_stats(&self, stats: &StatsRecord) -> RepositoryResult<StatsRecord> {
        self.check_health()?;
        Ok(self.data.write().store_stats(stats))
    }

    async fn get_stats(&self, lightcurve_filename: &str) -> RepositoryResult<Option<StatsRecord>> {
        self.check_health()?;
        Ok(self.data.read().stats.get(lightcurve_filename).cloned())
    }

    async fn list_stats(&self) -> RepositoryResult<Vec<StatsRecord>> {
        self.check_health()?;
        Ok(self.data.read().stats.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn exposure(filename: &str, targname: &str) -> Exposure {
        Exposure {
            id: None,
            filename: filename.to_string(),
            path: "/ingest".to_string(),
            telescope: "HST".to_string(),
            instrument: Instrument::Cos,
            detector: "FUV".to_string(),
            targname: targname.to_string(),
            cal_ver: "3.0".to_string(),
            obstype: ObsType::Spectroscopic,
            cenwave: 1300,
            opt_elem: "G130M".to_string(),
            aperture: "PSA".to_string(),
            fppos: 3,
            ingest_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        }
    }

    fn output(exposure_id: ExposureId) -> OutputRecord {
        OutputRecord {
            id: None,
            exposure_id,
            individual_path: "/out".to_string(),
            individual_filename: format!("{}_curve.json", exposure_id),
            composite_path: None,
            composite_filename: None,
        }
    }

    fn stats(filename: &str, total: i64) -> StatsRecord {
        StatsRecord {
            id: None,
            lightcurve_path: "/out".to_string(),
            lightcurve_filename: filename.to_string(),
            total,
            mean: None,
            mu: None,
            stdev: None,
            poisson_factor: None,
            pearson_r: None,
            pearson_p: None,
            periodogram: false,
            deliver: false,
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let repo = LocalRepository::new();
        assert!(repo.health_check().await.unwrap());

        repo.set_healthy(false);
        assert!(!repo.health_check().await.unwrap());
        let err = repo.list_exposures().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_upsert_exposure_overwrites_by_filename() {
        let repo = LocalRepository::new();
        let first = repo.upsert_exposure(&exposure("a_corrtag_a.json", "T1")).await.unwrap();
        let second = repo.upsert_exposure(&exposure("a_corrtag_a.json", "T2")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(repo.exposure_count(), 1);
        let stored = repo.get_exposure_by_filename("a_corrtag_a.json").await.unwrap().unwrap();
        assert_eq!(stored.targname, "T2");
    }

    #[tokio::test]
    async fn test_output_requires_exposure() {
        let repo = LocalRepository::new();
        let err = repo.upsert_output(&output(ExposureId(99))).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_pending_groups_and_composite_update() {
        let repo = LocalRepository::new();
        let a = repo.upsert_exposure(&exposure("a_corrtag_a.json", "T1")).await.unwrap();
        let b = repo.upsert_exposure(&exposure("b_corrtag_a.json", "T1")).await.unwrap();
        let c = repo.upsert_exposure(&exposure("c_corrtag_a.json", "T2")).await.unwrap();
        for e in [&a, &b, &c] {
            repo.upsert_output(&output(e.id.unwrap())).await.unwrap();
        }

        let pending = repo.list_pending_groups().await.unwrap();
        assert_eq!(pending.len(), 2);

        let members = repo.list_group_members(&a.dataset_key()).await.unwrap();
        let ids: Vec<ExposureId> = members.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a.id.unwrap(), b.id.unwrap()]);

        let updated = repo
            .complete_composite(&ids, "/composite", "t1.json", &stats("t1.json", 5))
            .await
            .unwrap();
        assert_eq!(updated, 2);
        assert_eq!(repo.get_stats("t1.json").await.unwrap().unwrap().total, 5);

        let pending = repo.list_pending_groups().await.unwrap();
        assert_eq!(pending, vec![c.dataset_key()]);

        // Re-ingest resets the composite
        repo.upsert_output(&output(a.id.unwrap())).await.unwrap();
        assert_eq!(repo.list_pending_groups().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_complete_composite_is_all_or_nothing() {
        let repo = LocalRepository::new();
        let a = repo.upsert_exposure(&exposure("a_corrtag_a.json", "T1")).await.unwrap();
        repo.upsert_output(&output(a.id.unwrap())).await.unwrap();

        let result = repo
            .complete_composite(&[a.id.unwrap(), ExposureId(42)], "/c", "x.json", &stats("x.json", 3))
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
        assert!(repo.get_output(a.id.unwrap()).await.unwrap().unwrap().is_pending());
        assert!(repo.list_stats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exposure_without_output_is_not_a_member() {
        let repo = LocalRepository::new();
        let a = repo.upsert_exposure(&exposure("a_corrtag_a.json", "T1")).await.unwrap();
        let b = repo.upsert_exposure(&exposure("b_corrtag_a.json", "T1")).await.unwrap();
        repo.upsert_output(&output(a.id.unwrap())).await.unwrap();

        let members = repo.list_group_members(&b.dataset_key()).await.unwrap();
        let ids: Vec<ExposureId> = members.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a.id.unwrap()]);
    }

    #[tokio::test]
    async fn test_upsert_stats_preserves_deliver() {
        let repo = LocalRepository::new();
        let mut curated = stats("curve.json", 10);
        curated.deliver = true;
        let first = repo.upsert_stats(&curated).await.unwrap();

        let second = repo.upsert_stats(&stats("curve.json", 12)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.deliver);
        assert_eq!(second.total, 12);
        assert_eq!(repo.list_stats().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_bad_data_upserts_by_filename() {
        let repo = LocalRepository::new();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut record = BadDataRecord {
            id: None,
            filename: "x_corrtag_a.json".to_string(),
            ingest_date: date,
            reason: BadDataReason::NoEvents,
        };
        repo.record_bad_data(&record).await.unwrap();
        record.reason = BadDataReason::ShortExposure;
        repo.record_bad_data(&record).await.unwrap();

        let all = repo.list_bad_data().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].reason, BadDataReason::ShortExposure);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let repo = LocalRepository::new();
        let a = repo.upsert_exposure(&exposure("a_corrtag_a.json", "T1")).await.unwrap();
        repo.upsert_output(&output(a.id.unwrap())).await.unwrap();
        repo.upsert_stats(&stats("curve.json", 1)).await.unwrap();

        repo.reset().await.unwrap();
        assert!(repo.list_exposures().await.unwrap().is_empty());
        assert!(repo.list_outputs().await.unwrap().is_empty());
        assert!(repo.list_stats().await.unwrap().is_empty());
    }
}
