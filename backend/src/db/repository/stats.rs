//! Lightcurve statistics catalog trait: the `stats` table.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::StatsRecord;

#[async_trait]
pub trait StatsRepository: Send + Sync {
    /// Insert or overwrite the statistics of a lightcurve, keyed by its filename.
    ///
    /// The `deliver` flag of an existing record is preserved; it is only ever
    /// set by hand.
    async fn upsert_stats(&self, stats: &StatsRecord) -> RepositoryResult<StatsRecord>;

    async fn get_stats(&self, lightcurve_filename: &str) -> RepositoryResult<Option<StatsRecord>>;

    /// All statistics ordered by lightcurve filename.
    async fn list_stats(&self) -> RepositoryResult<Vec<StatsRecord>>;
}
