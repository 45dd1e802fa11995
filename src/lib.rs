//! Glacier: incremental loader for Stripe Parquet snapshots.
//!
//! This crate handles:
//! - Discovering completed snapshot folders in object storage (S3 or local)
//! - Extracting fixed column projections from per-table Parquet file sets
//! - Idempotent staging and upsert into a Postgres warehouse
//! - A load ledger so each snapshot is applied at most once
//! - Retention sweeping of snapshot folders from prior days

pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod rows;
pub mod snapshot;
pub mod storage;
pub mod sweep;
pub mod tables;
pub mod tracing;
pub mod warehouse;

// Re-export commonly used items
pub use config::{Config, RunMode, SweepConfig};
pub use error::PipelineError;
pub use pipeline::{Pipeline, RunOutcome, RunReport, TableOutcome};
pub use snapshot::{IdFormat, SnapshotId};
pub use storage::SnapshotStore;
pub use tables::TableSpec;
pub use tracing::init_tracing;
pub use warehouse::{MemoryWarehouse, PostgresWarehouse, Warehouse, WarehouseRef};
