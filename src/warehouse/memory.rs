//! In-memory warehouse for testing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::WarehouseError;
use crate::rows::{RowSet, Value};
use crate::snapshot::SnapshotId;
use crate::tables::TableSpec;
use crate::warehouse::Warehouse;

fn poisoned() -> WarehouseError {
    WarehouseError::Internal {
        message: "lock poisoned".to_string(),
    }
}

/// In-memory warehouse for testing.
///
/// Rows are keyed by the spec's conflict key, mirroring the Postgres upsert
/// semantics. Individual tables can be told to fail their next merge, which
/// the pipeline tests use to exercise per-table failure isolation.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    ledger: RwLock<HashSet<String>>,
    tables: RwLock<HashMap<String, BTreeMap<String, Vec<Value>>>>,
    failing: RwLock<HashSet<String>>,
    failing_ledger: RwLock<bool>,
}

impl MemoryWarehouse {
    /// Create a new empty in-memory warehouse.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Force every merge of the named table to fail.
    pub fn fail_table(&self, name: &str) {
        self.failing
            .write()
            .expect("lock poisoned")
            .insert(name.to_string());
    }

    /// Force every ledger write to fail.
    pub fn fail_ledger(&self) {
        *self.failing_ledger.write().expect("lock poisoned") = true;
    }

    /// Rows currently in a table, ordered by conflict key.
    pub fn table_rows(&self, name: &str) -> Vec<Vec<Value>> {
        self.tables
            .read()
            .expect("lock poisoned")
            .get(name)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of rows in a table.
    pub fn row_count(&self, name: &str) -> usize {
        self.tables
            .read()
            .expect("lock poisoned")
            .get(name)
            .map(BTreeMap::len)
            .unwrap_or_default()
    }

    /// Look up a single row by a single-column text conflict-key value.
    pub fn row(&self, table: &str, key: &str) -> Option<Vec<Value>> {
        let fragment = Value::Text(key.to_string()).key_fragment();
        self.tables
            .read()
            .expect("lock poisoned")
            .get(table)
            .and_then(|t| t.get(&fragment))
            .cloned()
    }

    fn conflict_key(
        spec: &TableSpec,
        rows: &RowSet,
        row: &[Value],
    ) -> Result<String, WarehouseError> {
        let mut parts = Vec::with_capacity(spec.key.len());
        for key in &spec.key {
            let index = rows
                .column_index(key)
                .ok_or_else(|| WarehouseError::Internal {
                    message: format!(
                        "key column '{key}' missing from row set for table '{}'",
                        spec.name
                    ),
                })?;
            parts.push(row[index].key_fragment());
        }
        Ok(parts.join("\u{1f}"))
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn is_loaded(&self, snapshot: &SnapshotId) -> Result<bool, WarehouseError> {
        let ledger = self.ledger.read().map_err(|_| poisoned())?;
        Ok(ledger.contains(snapshot.as_str()))
    }

    async fn mark_loaded(&self, snapshot: &SnapshotId) -> Result<(), WarehouseError> {
        if *self.failing_ledger.read().map_err(|_| poisoned())? {
            return Err(WarehouseError::Internal {
                message: "forced ledger failure".to_string(),
            });
        }
        let mut ledger = self.ledger.write().map_err(|_| poisoned())?;
        // Duplicate insert is a no-op, matching ON CONFLICT DO NOTHING
        ledger.insert(snapshot.as_str().to_string());
        Ok(())
    }

    async fn loaded_set(&self) -> Result<HashSet<String>, WarehouseError> {
        let ledger = self.ledger.read().map_err(|_| poisoned())?;
        Ok(ledger.clone())
    }

    async fn merge_table(&self, spec: &TableSpec, rows: &RowSet) -> Result<u64, WarehouseError> {
        if self.failing.read().map_err(|_| poisoned())?.contains(&spec.name) {
            return Err(WarehouseError::Internal {
                message: format!("forced failure for table '{}'", spec.name),
            });
        }

        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let table = tables.entry(spec.name.clone()).or_default();
        for row in &rows.rows {
            let key = Self::conflict_key(spec, rows, row)?;
            table.insert(key, row.clone());
        }
        Ok(rows.len() as u64)
    }
}
