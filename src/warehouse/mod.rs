//! Warehouse backends: load ledger and merge engine.
//!
//! The primary implementation targets PostgreSQL; an in-memory
//! implementation is provided for testing the pipeline without a database.

mod memory;
mod postgres;
mod sql;

pub use memory::MemoryWarehouse;
pub use postgres::PostgresWarehouse;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WarehouseError;
use crate::rows::RowSet;
use crate::snapshot::SnapshotId;
use crate::tables::TableSpec;

/// A reference-counted warehouse handle.
pub type WarehouseRef = Arc<dyn Warehouse>;

/// Backend for the load ledger and the per-table merge.
///
/// Implementations must make `merge_table` atomic: either every row's
/// upsert and the staging truncate commit together, or none do. The ledger
/// operations must be conflict-safe so that marking the same snapshot twice
/// is a no-op rather than an error.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// True iff the snapshot is present in the persisted ledger.
    async fn is_loaded(&self, snapshot: &SnapshotId) -> Result<bool, WarehouseError>;

    /// Idempotent ledger insert; succeeds silently if already present.
    async fn mark_loaded(&self, snapshot: &SnapshotId) -> Result<(), WarehouseError>;

    /// The full set of loaded snapshot identifiers.
    async fn loaded_set(&self) -> Result<HashSet<String>, WarehouseError>;

    /// Stage `rows` and upsert them into the target table.
    ///
    /// Staging is truncated before the write, the upsert overwrites non-key
    /// columns on conflict (last-snapshot-wins), and the staging truncate
    /// commits in the same transaction as the upsert.
    ///
    /// Returns the number of rows applied.
    async fn merge_table(&self, spec: &TableSpec, rows: &RowSet) -> Result<u64, WarehouseError>;
}
