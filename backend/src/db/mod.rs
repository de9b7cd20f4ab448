//! Relational catalog of exposures, output products, rejected files and
//! lightcurve statistics.
//!
//! The services see the catalog only through the traits in [`repository`]:
//! [`ExposureRepository`] for exposures, outputs and dataset groups,
//! [`BadDataRepository`] for rejected files and [`StatsRepository`] for the
//! stats table. [`LocalRepository`] keeps everything in memory;
//! `PostgresRepository` (feature `postgres-repo`) stores it through Diesel.
//!
//! There is no process-wide catalog handle. Callers resolve a
//! [`CatalogSource`], open it and pass the handle down explicitly:
//!
//! ```ignore
//! use hstlc::db::CatalogSource;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = CatalogSource::resolve()?.open()?;
//!     let pending = repo.list_pending_groups().await?;
//!     println!("{} groups pending", pending.len());
//!     Ok(())
//! }
//! ```

#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod factory;
pub mod repo_config;
pub mod repositories;
pub mod repository;

#[cfg(feature = "postgres-repo")]
pub use repositories::postgres::PostgresConfig;
/// Placeholder so [`CatalogSource`] has the same shape without the feature.
#[cfg(not(feature = "postgres-repo"))]
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    _private: (),
}

pub use factory::{CatalogSource, RepositoryType};
pub use repo_config::RepositoryConfig;
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::{
    BadDataRepository, ErrorContext, ExposureRepository, FullRepository, RepositoryError,
    RepositoryResult, StatsRepository,
};
