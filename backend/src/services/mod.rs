//! Service layer: ingest, product building and the reprocessing driver.
//!
//! Services sit between the catalog traits and the binaries. They take the
//! catalog handle explicitly and do CPU-bound work under `spawn_blocking`.

pub mod composite;
pub mod data_checks;
pub mod ingest;
pub mod pipeline;
pub mod stats_table;

pub use composite::{build_composite, make_individual, CompositeBuild, CompositeError};
pub use data_checks::{dataset_ok, CheckSettings, CHECKS};
pub use ingest::{ingest_directory, ingest_file, IngestError, IngestOutcome, IngestSummary};
pub use pipeline::{run_composites, CompositeSettings, GroupState, PipelineError, PipelineSummary};
pub use stats_table::{build_stats_table, compute_lightcurve_stats, StatsTableError, StatsTableSummary};
