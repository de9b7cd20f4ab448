//! Postgres catalog on Diesel.
//!
//! Every call checks a connection out of an r2d2 pool on a blocking thread.
//! Connection failures and serialization conflicts are replayed with a
//! doubling delay. Embedded migrations run when the catalog is opened.
//!
//! Settings come from `[postgres]` in `hstlc.toml`, or from the environment:
//!
//! | Variable | Default |
//! |---|---|
//! | `DATABASE_URL` or `PG_DATABASE_URL` | required |
//! | `PG_POOL_MAX` / `PG_POOL_MIN` | 10 / 1 |
//! | `PG_CONN_TIMEOUT_SEC` / `PG_IDLE_TIMEOUT_SEC` | 30 / 600 |
//! | `PG_MAX_RETRIES` / `PG_RETRY_DELAY_MS` | 3 / 100 |

use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::task;
use tracing::{debug, info};

use crate::api::{
    BadDataRecord, DatasetKey, Exposure, ExposureId, GroupMember, Instrument, OutputRecord,
    StatsRecord,
};
use crate::db::repository::{
    BadDataRepository, ErrorContext, ExposureRepository, RepositoryError, RepositoryResult,
    StatsRepository,
};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub max_pool_size: u32,
    pub min_pool_size: u32,
    pub connection_timeout_sec: u64,
    pub idle_timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Create configuration from environment variables (see module docs).
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        let defaults = Self::default();
        Ok(Self {
            database_url,
            max_pool_size: env_or("PG_POOL_MAX", defaults.max_pool_size),
            min_pool_size: env_or("PG_POOL_MIN", defaults.min_pool_size),
            connection_timeout_sec: env_or("PG_CONN_TIMEOUT_SEC", defaults.connection_timeout_sec),
            idle_timeout_sec: env_or("PG_IDLE_TIMEOUT_SEC", defaults.idle_timeout_sec),
            max_retries: env_or("PG_MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("PG_RETRY_DELAY_MS", defaults.retry_delay_ms),
        })
    }
}

/// Diesel-backed catalog.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresRepository {
    /// Open the pool and run pending migrations.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build(ConnectionManager::<PgConnection>::new(&config.database_url))
            .map_err(|e| {
                RepositoryError::connection(e.to_string()).at(ErrorContext::new("create_pool"))
            })?;

        let mut conn = pool.get().map_err(|e| {
            RepositoryError::connection(e.to_string()).at(ErrorContext::new("run_migrations"))
        })?;
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal(format!("Migration failed: {e}"))
                .at(ErrorContext::new("run_migrations"))
        })?;
        drop(conn);

        info!(max_pool_size = config.max_pool_size, "Postgres catalog ready");
        Ok(Self { pool, config })
    }

    /// Run `f` on a pooled connection. Retryable failures are replayed up to
    /// `max_retries` times.
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let first_delay = Duration::from_millis(self.config.retry_delay_ms);

        task::spawn_blocking(move || {
            let mut delay = first_delay;
            let mut attempt = 0;
            loop {
                let result = pool
                    .get()
                    .map_err(|e| {
                        RepositoryError::connection(e.to_string()).at(
                            ErrorContext::new("get_connection")
                                .details(format!("attempt={}", attempt + 1)),
                        )
                    })
                    .and_then(|mut conn| f.clone()(&mut conn));
                match result {
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        attempt += 1;
                        debug!(attempt, error = %e, "Retrying catalog operation");
                        std::thread::sleep(delay);
                        delay *= 2;
                    }
                    done => return done,
                }
            }
        })
        .await
        .map_err(|e| {
            RepositoryError::internal(format!("Catalog worker failed: {e}"))
                .at(ErrorContext::new("spawn_blocking"))
        })?
    }
}

/// Stats upsert keyed by lightcurve filename; `deliver` is not in the changeset.
fn upsert_stats_row(conn: &mut PgConnection, row: &NewStatsRow) -> RepositoryResult<StatsRow> {
    diesel::insert_into(stats::table)
        .values(row)
        .on_conflict(stats::lightcurve_filename)
        .do_update()
        .set(row)
        .returning(StatsRow::as_returning())
        .get_result(conn)
        .map_err(RepositoryError::from)
}

type DatasetColumns = (String, String, String, String, i32, String);

fn columns_to_key(columns: DatasetColumns) -> RepositoryResult<DatasetKey> {
    let (instrument, detector, targname, opt_elem, cenwave, aperture) = columns;
    let instrument = instrument.parse::<Instrument>().map_err(|e| {
        RepositoryError::internal(e).at(ErrorContext::new("list_pending_groups"))
    })?;
    Ok(DatasetKey {
        instrument,
        detector,
        targname,
        opt_elem,
        cenwave,
        aperture,
    })
}

#[async_trait]
impl ExposureRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(RepositoryError::from)
        })
        .await
    }

    async fn upsert_exposure(&self, exposure: &Exposure) -> RepositoryResult<Exposure> {
        let row = NewMetadataRow::from(exposure);
        self.with_conn(move |conn| {
            let stored: MetadataRow = diesel::insert_into(metadata::table)
                .values(&row)
                .on_conflict(metadata::filename)
                .do_update()
                .set(&row)
                .returning(MetadataRow::as_returning())
                .get_result(conn)
                .map_err(RepositoryError::from)?;
            Exposure::try_from(stored)
        })
        .await
    }

    async fn get_exposure_by_filename(
        &self,
        filename: &str,
    ) -> RepositoryResult<Option<Exposure>> {
        let filename = filename.to_string();
        self.with_conn(move |conn| {
            metadata::table
                .filter(metadata::filename.eq(&filename))
                .select(MetadataRow::as_select())
                .first::<MetadataRow>(conn)
                .optional()
                .map_err(RepositoryError::from)?
                .map(Exposure::try_from)
                .transpose()
        })
        .await
    }

    async fn list_exposures(&self) -> RepositoryResult<Vec<Exposure>> {
        self.with_conn(|conn| {
            metadata::table
                .order(metadata::id.asc())
                .select(MetadataRow::as_select())
                .load::<MetadataRow>(conn)
                .map_err(RepositoryError::from)?
                .into_iter()
                .map(Exposure::try_from)
                .collect()
        })
        .await
    }

    async fn upsert_output(&self, output: &OutputRecord) -> RepositoryResult<OutputRecord> {
        let row = NewOutputRow::from(output);
        self.with_conn(move |conn| {
            conn.transaction::<_, RepositoryError, _>(|tx| {
                let exists: i64 = metadata::table
                    .filter(metadata::id.eq(row.metadata_id))
                    .count()
                    .get_result(tx)?;
                if exists == 0 {
                    return Err(RepositoryError::validation("Output refers to an unknown exposure")
                        .at(ErrorContext::new("upsert_output").row("outputs", row.metadata_id)));
                }

                let stored: OutputRow = diesel::insert_into(outputs::table)
                    .values(&row)
                    .on_conflict(outputs::metadata_id)
                    .do_update()
                    .set(&row)
                    .returning(OutputRow::as_returning())
                    .get_result(tx)?;
                Ok(OutputRecord::from(stored))
            })
        })
        .await
    }

    async fn get_output(&self, exposure_id: ExposureId) -> RepositoryResult<Option<OutputRecord>> {
        self.with_conn(move |conn| {
            Ok(outputs::table
                .filter(outputs::metadata_id.eq(exposure_id.value()))
                .select(OutputRow::as_select())
                .first::<OutputRow>(conn)
                .optional()
                .map_err(RepositoryError::from)?
                .map(OutputRecord::from))
        })
        .await
    }

    async fn list_outputs(&self) -> RepositoryResult<Vec<OutputRecord>> {
        self.with_conn(|conn| {
            Ok(outputs::table
                .order(outputs::metadata_id.asc())
                .select(OutputRow::as_select())
                .load::<OutputRow>(conn)
                .map_err(RepositoryError::from)?
                .into_iter()
                .map(OutputRecord::from)
                .collect())
        })
        .await
    }

    async fn list_pending_groups(&self) -> RepositoryResult<Vec<DatasetKey>> {
        self.with_conn(|conn| {
            let rows: Vec<DatasetColumns> = metadata::table
                .inner_join(outputs::table)
                .filter(outputs::composite_path.is_null())
                .select((
                    metadata::instrument,
                    metadata::detector,
                    metadata::targname,
                    metadata::opt_elem,
                    metadata::cenwave,
                    metadata::aperture,
                ))
                .distinct()
                .load(conn)
                .map_err(RepositoryError::from)?;

            let keys = rows
                .into_iter()
                .map(columns_to_key)
                .collect::<RepositoryResult<BTreeSet<DatasetKey>>>()?;
            Ok(keys.into_iter().collect())
        })
        .await
    }

    async fn list_group_members(&self, key: &DatasetKey) -> RepositoryResult<Vec<GroupMember>> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let rows: Vec<(i64, String, String)> = metadata::table
                .inner_join(outputs::table)
                .filter(metadata::instrument.eq(key.instrument.as_str()))
                .filter(metadata::detector.eq(&key.detector))
                .filter(metadata::targname.eq(&key.targname))
                .filter(metadata::opt_elem.eq(&key.opt_elem))
                .filter(metadata::cenwave.eq(key.cenwave))
                .filter(metadata::aperture.eq(&key.aperture))
                .order(metadata::id.asc())
                .select((metadata::id, metadata::path, metadata::filename))
                .load(conn)
                .map_err(RepositoryError::from)?;

            Ok(rows
                .into_iter()
                .map(|(id, path, filename)| GroupMember {
                    id: ExposureId(id),
                    path,
                    filename,
                })
                .collect())
        })
        .await
    }

    async fn complete_composite(
        &self,
        exposure_ids: &[ExposureId],
        composite_path: &str,
        composite_filename: &str,
        stats: &StatsRecord,
    ) -> RepositoryResult<usize> {
        let ids: Vec<i64> = exposure_ids
            .iter()
            .map(|id| id.value())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let path = composite_path.to_string();
        let filename = composite_filename.to_string();
        let row = NewStatsRow::from(stats);

        self.with_conn(move |conn| {
            conn.transaction::<_, RepositoryError, _>(|tx| {
                let updated = diesel::update(outputs::table.filter(outputs::metadata_id.eq_any(&ids)))
                    .set((
                        outputs::composite_path.eq(&path),
                        outputs::composite_filename.eq(&filename),
                    ))
                    .execute(tx)?;

                // Returning an error rolls the whole batch back
                if updated != ids.len() {
                    return Err(RepositoryError::not_found("No output record for some exposures").at(
                        ErrorContext::new("complete_composite")
                            .details(format!("expected={}, updated={}", ids.len(), updated)),
                    ));
                }
                upsert_stats_row(tx, &row)?;
                Ok(updated)
            })
        })
        .await
    }

    async fn reset(&self) -> RepositoryResult<()> {
        self.with_conn(|conn| {
            conn.transaction::<_, RepositoryError, _>(|tx| {
                diesel::delete(stats::table).execute(tx)?;
                diesel::delete(bad_data::table).execute(tx)?;
                diesel::delete(outputs::table).execute(tx)?;
                diesel::delete(metadata::table).execute(tx)?;
                Ok(())
            })
        })
        .await
    }
}

#[async_trait]
impl BadDataRepository for PostgresRepository {
    async fn record_bad_data(&self, record: &BadDataRecord) -> RepositoryResult<BadDataRecord> {
        let row = NewBadDataRow::from(record);
        self.with_conn(move |conn| {
            let stored: BadDataRow = diesel::insert_into(bad_data::table)
                .values(&row)
                .on_conflict(bad_data::filename)
                .do_update()
                .set(&row)
                .returning(BadDataRow::as_returning())
                .get_result(conn)
                .map_err(RepositoryError::from)?;
            BadDataRecord::try_from(stored)
        })
        .await
    }

    async fn list_bad_data(&self) -> RepositoryResult<Vec<BadDataRecord>> {
        self.with_conn(|conn| {
            bad_data::table
                .order(bad_data::filename.asc())
                .select(BadDataRow::as_select())
                .load::<BadDataRow>(conn)
                .map_err(RepositoryError::from)?
                .into_iter()
                .map(BadDataRecord::try_from)
                .collect()
        })
        .await
    }
}

#[async_trait]
impl StatsRepository for PostgresRepository {
    async fn upsert_stats(&self, record: &StatsRecord) -> RepositoryResult<StatsRecord> {
        let row = NewStatsRow::from(record);
        self.with_conn(move |conn| upsert_stats_row(conn, &row).map(StatsRecord::from))
            .await
    }

    async fn get_stats(&self, lightcurve_filename: &str) -> RepositoryResult<Option<StatsRecord>> {
        let filename = lightcurve_filename.to_string();
        self.with_conn(move |conn| {
            Ok(stats::table
                .filter(stats::lightcurve_filename.eq(&filename))
                .select(StatsRow::as_select())
                .first::<StatsRow>(conn)
                .optional()
                .map_err(RepositoryError::from)?
                .map(StatsRecord::from))
        })
        .await
    }

    async fn list_stats(&self) -> RepositoryResult<Vec<StatsRecord>> {
        self.with_conn(|conn| {
            Ok(stats::table
                .order(stats::lightcurve_filename.asc())
                .select(StatsRow::as_select())
                .load::<StatsRow>(conn)
                .map_err(RepositoryError::from)?
                .into_iter()
                .map(StatsRecord::from)
                .collect())
        })
        .await
    }
}
