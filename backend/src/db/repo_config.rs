//! Catalog configuration file support.
//!
//! The `[repository]` and `[postgres]` sections of `hstlc.toml` select and
//! configure the catalog backend. Other sections are ignored here.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::factory::{CatalogSource, RepositoryType};
use super::repository::{RepositoryError, RepositoryResult};

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "HSTLC_CONFIG";

const SEARCH_PATHS: [&str; 3] = ["hstlc.toml", "backend/hstlc.toml", "../hstlc.toml"];

/// Locate `hstlc.toml`: `HSTLC_CONFIG` first, then the standard locations.
pub fn locate_config_file() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(explicit));
    }
    SEARCH_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub repository: RepositorySettings,
    pub postgres: PostgresSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type")]
    pub repo_type: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            repo_type: "local".to_string(),
        }
    }
}

/// `[postgres]` keys; missing keys take the pool defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresSettings {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Seconds
    pub connect_timeout: u64,
    /// Seconds
    pub idle_timeout: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: 30,
            idle_timeout: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

impl RepositoryConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> RepositoryResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RepositoryError::configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            RepositoryError::configuration(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn repository_type(&self) -> RepositoryResult<RepositoryType> {
        self.repository.repo_type.parse()
    }

    /// The catalog this file selects.
    pub fn source(&self) -> RepositoryResult<CatalogSource> {
        match self.repository_type()? {
            RepositoryType::Local => Ok(CatalogSource::Local),
            RepositoryType::Postgres => self.postgres.to_postgres_config().map(CatalogSource::Postgres),
        }
    }
}

impl PostgresSettings {
    #[cfg(feature = "postgres-repo")]
    fn to_postgres_config(&self) -> RepositoryResult<crate::db::PostgresConfig> {
        if self.database_url.is_empty() {
            return Err(RepositoryError::configuration(
                "Postgres repository requires 'postgres.database_url' setting",
            ));
        }
        Ok(crate::db::PostgresConfig {
            database_url: self.database_url.clone(),
            max_pool_size: self.max_connections,
            min_pool_size: self.min_connections,
            connection_timeout_sec: self.connect_timeout,
            idle_timeout_sec: self.idle_timeout,
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
        })
    }

    #[cfg(not(feature = "postgres-repo"))]
    fn to_postgres_config(&self) -> RepositoryResult<crate::db::PostgresConfig> {
        Err(super::factory::postgres_disabled())
    }
}
