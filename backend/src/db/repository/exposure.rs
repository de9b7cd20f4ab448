//! Exposure catalog trait: the `metadata` and `outputs` tables.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{DatasetKey, Exposure, ExposureId, GroupMember, OutputRecord, StatsRecord};

/// Repository trait for exposures and their output products.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; workers share one handle.
#[async_trait]
pub trait ExposureRepository: Send + Sync {
    /// Check that the catalog is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;

    // ==================== Exposures ====================

    /// Insert an exposure, or overwrite the record with the same filename.
    ///
    /// # Returns
    /// * `Ok(Exposure)` - The stored record with its id set
    async fn upsert_exposure(&self, exposure: &Exposure) -> RepositoryResult<Exposure>;

    async fn get_exposure_by_filename(&self, filename: &str)
        -> RepositoryResult<Option<Exposure>>;

    /// All exposures ordered by id.
    async fn list_exposures(&self) -> RepositoryResult<Vec<Exposure>>;

    // ==================== Outputs ====================

    /// Insert or overwrite the output record of `output.exposure_id`.
    ///
    /// # Returns
    /// * `Ok(OutputRecord)` - The stored record with its id set
    /// * `Err(RepositoryError::ValidationError)` - If the exposure does not exist
    async fn upsert_output(&self, output: &OutputRecord) -> RepositoryResult<OutputRecord>;

    async fn get_output(&self, exposure_id: ExposureId) -> RepositoryResult<Option<OutputRecord>>;

    /// All output records ordered by exposure id.
    async fn list_outputs(&self) -> RepositoryResult<Vec<OutputRecord>>;

    // ==================== Dataset groups ====================

    /// Distinct keys of the groups with at least one member whose composite
    /// path is null, in key order.
    async fn list_pending_groups(&self) -> RepositoryResult<Vec<DatasetKey>>;

    /// Exposures of a group that have an output record, ordered by id.
    ///
    /// An exposure without an output record never got an individual
    /// product and is not a member.
    async fn list_group_members(&self, key: &DatasetKey) -> RepositoryResult<Vec<GroupMember>>;

    /// Register a finished composite: point the output records of
    /// `exposure_ids` at it and upsert its stats row.
    ///
    /// Both happen in one batched write; either everything changes or nothing does.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of output records updated
    /// * `Err(RepositoryError::NotFound)` - If an exposure has no output record
    async fn complete_composite(
        &self,
        exposure_ids: &[ExposureId],
        composite_path: &str,
        composite_filename: &str,
        stats: &StatsRecord,
    ) -> RepositoryResult<usize>;

    // ==================== Maintenance ====================

    /// Delete every row of every catalog table.
    async fn reset(&self) -> RepositoryResult<()>;
}
