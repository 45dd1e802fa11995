//! SQL statement builders for the ledger, staging, and merge steps.
//!
//! Identifiers are interpolated directly, so every table and column name
//! must have passed [`TableSpec::validate`](crate::tables::TableSpec::validate)
//! before reaching these builders.

use crate::tables::TableSpec;

/// Name of the load ledger table.
pub const LEDGER_TABLE: &str = "loaded_snapshots";

/// DDL for the load ledger.
pub fn create_ledger(schema: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS {schema}.{LEDGER_TABLE} (folder_name TEXT PRIMARY KEY)")
}

/// Membership check against the ledger.
pub fn ledger_contains(schema: &str) -> String {
    format!("SELECT 1 FROM {schema}.{LEDGER_TABLE} WHERE folder_name = $1")
}

/// Conflict-safe ledger insert; a duplicate insert is a no-op.
pub fn ledger_insert(schema: &str) -> String {
    format!(
        "INSERT INTO {schema}.{LEDGER_TABLE} (folder_name) VALUES ($1) \
         ON CONFLICT (folder_name) DO NOTHING"
    )
}

/// Full ledger contents, for backlog computation.
pub fn ledger_select_all(schema: &str) -> String {
    format!("SELECT folder_name FROM {schema}.{LEDGER_TABLE}")
}

fn column_ddl(spec: &TableSpec) -> String {
    spec.columns
        .iter()
        .map(|c| format!("{} {}", c.name, c.sql_type.ddl()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// DDL for a target table, keyed by the spec's conflict columns.
pub fn create_target(schema: &str, spec: &TableSpec) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {schema}.{} ({}, PRIMARY KEY ({}))",
        spec.name,
        column_ddl(spec),
        spec.key.join(", ")
    )
}

/// DDL for a staging table: same shape as the target, no key.
pub fn create_staging(schema: &str, spec: &TableSpec) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {schema}.{} ({})",
        spec.staging_name(),
        column_ddl(spec)
    )
}

/// Truncate the staging table.
pub fn truncate_staging(schema: &str, spec: &TableSpec) -> String {
    format!("TRUNCATE TABLE {schema}.{}", spec.staging_name())
}

/// Multi-row parameterized insert into the staging table.
pub fn insert_staging(schema: &str, spec: &TableSpec, row_count: usize) -> String {
    let columns = spec.column_names().join(", ");
    let width = spec.columns.len();
    let placeholders: Vec<String> = (0..row_count)
        .map(|row| {
            let params: Vec<String> = (0..width)
                .map(|col| format!("${}", row * width + col + 1))
                .collect();
            format!("({})", params.join(", "))
        })
        .collect();
    format!(
        "INSERT INTO {schema}.{} ({columns}) VALUES {}",
        spec.staging_name(),
        placeholders.join(", ")
    )
}

/// Upsert from staging into the target table.
///
/// Non-key columns are overwritten from the incoming row (last-snapshot-wins);
/// a spec whose every column is part of the key degenerates to `DO NOTHING`.
pub fn upsert_from_staging(schema: &str, spec: &TableSpec) -> String {
    let columns = spec.column_names().join(", ");
    let non_key = spec.non_key_columns();
    let conflict_action = if non_key.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let updates: Vec<String> = non_key
            .iter()
            .map(|c| format!("{} = EXCLUDED.{}", c.name, c.name))
            .collect();
        format!("DO UPDATE SET {}", updates.join(", "))
    };
    format!(
        "INSERT INTO {schema}.{target} ({columns}) SELECT {columns} FROM {schema}.{staging} \
         ON CONFLICT ({key}) {conflict_action}",
        target = spec.name,
        staging = spec.staging_name(),
        key = spec.key.join(", "),
    )
}
