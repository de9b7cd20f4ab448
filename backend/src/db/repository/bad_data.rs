//! Rejected-file catalog trait: the `bad_data` table.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::BadDataRecord;

#[async_trait]
pub trait BadDataRepository: Send + Sync {
    /// Record a rejected file, overwriting any earlier record for the same filename.
    async fn record_bad_data(&self, record: &BadDataRecord) -> RepositoryResult<BadDataRecord>;

    /// All rejected files ordered by filename.
    async fn list_bad_data(&self) -> RepositoryResult<Vec<BadDataRecord>>;
}
