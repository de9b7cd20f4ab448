//! Catalog backends.
//!
//! - `local`: in-memory catalog for tests and single-process runs
//! - `postgres`: PostgreSQL catalog with Diesel ORM
pub mod local;
#[cfg(feature = "postgres-repo")]
pub mod postgres;

pub use local::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use postgres::{PostgresConfig, PostgresRepository};
