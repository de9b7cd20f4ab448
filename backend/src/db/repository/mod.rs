//! Catalog trait definitions.
//!
//! - [`error`]: error types for catalog operations
//! - [`exposure`]: exposures, output products and dataset groups
//! - [`bad_data`]: files rejected by the data-quality gate
//! - [`stats`]: lightcurve statistics
//!
//! Functions that need the whole catalog take a [`FullRepository`]:
//!
//! ```ignore
//! async fn reprocess<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<()> {
//!     for key in repo.list_pending_groups().await? {
//!         let members = repo.list_group_members(&key).await?;
//!         // ...
//!     }
//!     Ok(())
//! }
//! ```

pub mod bad_data;
pub mod error;
pub mod exposure;
pub mod stats;

pub use bad_data::BadDataRepository;
pub use error::{ErrorContext, RepositoryError, RepositoryResult};
pub use exposure::ExposureRepository;
pub use stats::StatsRepository;

/// Composite bound for a complete catalog implementation.
pub trait FullRepository: ExposureRepository + BadDataRepository + StatsRepository {}

impl<T> FullRepository for T where T: ExposureRepository + BadDataRepository + StatsRepository {}
