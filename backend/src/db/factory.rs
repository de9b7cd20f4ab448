//! Catalog selection.
//!
//! A [`CatalogSource`] names the backend to open together with its settings.
//! It is resolved once at startup from `REPOSITORY_TYPE`, `hstlc.toml` or the
//! database URL variables, then opened into the handle the services share.

use std::str::FromStr;
use std::sync::Arc;

use super::repo_config::{locate_config_file, RepositoryConfig};
use super::repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
use super::repositories::PostgresRepository;
use super::repository::{FullRepository, RepositoryError, RepositoryResult};
use super::PostgresConfig;

const REPOSITORY_TYPE_ENV: &str = "REPOSITORY_TYPE";

/// Catalog backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    /// Diesel catalog on Postgres
    Postgres,
    /// In-memory catalog, lost on exit
    Local,
}

impl FromStr for RepositoryType {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "local" => Ok(Self::Local),
            _ => Err(RepositoryError::configuration(format!(
                "Unknown repository type: {s}"
            ))),
        }
    }
}

impl RepositoryType {
    /// `REPOSITORY_TYPE` when it parses; otherwise Postgres if a database URL
    /// is set, else Local.
    pub fn from_env() -> Self {
        if let Ok(val) = std::env::var(REPOSITORY_TYPE_ENV) {
            return val.parse().unwrap_or(Self::Local);
        }
        if std::env::var("DATABASE_URL").is_ok() || std::env::var("PG_DATABASE_URL").is_ok() {
            Self::Postgres
        } else {
            Self::Local
        }
    }
}

pub(crate) fn postgres_disabled() -> RepositoryError {
    RepositoryError::configuration("Postgres repository feature not enabled")
}

/// A catalog backend and the settings needed to open it.
#[derive(Debug, Clone)]
pub enum CatalogSource {
    Local,
    Postgres(PostgresConfig),
}

impl CatalogSource {
    pub fn repository_type(&self) -> RepositoryType {
        match self {
            Self::Local => RepositoryType::Local,
            Self::Postgres(_) => RepositoryType::Postgres,
        }
    }

    /// Source described by the environment alone.
    pub fn from_env() -> RepositoryResult<Self> {
        match RepositoryType::from_env() {
            RepositoryType::Local => Ok(Self::Local),
            #[cfg(feature = "postgres-repo")]
            RepositoryType::Postgres => PostgresConfig::from_env()
                .map(Self::Postgres)
                .map_err(RepositoryError::configuration),
            #[cfg(not(feature = "postgres-repo"))]
            RepositoryType::Postgres => Err(postgres_disabled()),
        }
    }

    /// Source a binary should use.
    ///
    /// `REPOSITORY_TYPE` wins when set; otherwise a located `hstlc.toml`
    /// decides; otherwise the environment defaults apply.
    pub fn resolve() -> RepositoryResult<Self> {
        if std::env::var(REPOSITORY_TYPE_ENV).is_ok() {
            return Self::from_env();
        }
        match locate_config_file() {
            Some(path) => RepositoryConfig::from_file(path)?.source(),
            None => Self::from_env(),
        }
    }

    /// Open the catalog. Postgres connects and runs pending migrations here.
    pub fn open(self) -> RepositoryResult<Arc<dyn FullRepository>> {
        match self {
            Self::Local => Ok(Arc::new(LocalRepository::new())),
            #[cfg(feature = "postgres-repo")]
            Self::Postgres(config) => Ok(Arc::new(PostgresRepository::new(config)?)),
            #[cfg(not(feature = "postgres-repo"))]
            Self::Postgres(_) => Err(postgres_disabled()),
        }
    }
}
