//! PostgreSQL warehouse implementation.

use std::collections::HashSet;

use async_trait::async_trait;
use snafu::prelude::*;
use sqlx::Row;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::Query;
use tracing::{debug, info};

use crate::config::WarehouseConfig;
use crate::error::{ConnectSnafu, InvalidConfigSnafu, QuerySnafu, WarehouseError};
use crate::rows::{RowSet, Value};
use crate::snapshot::SnapshotId;
use crate::tables::{SqlType, TableSpec};
use crate::warehouse::{Warehouse, sql};

/// Postgres parameter limit is u16::MAX; stay well below it per statement.
const MAX_PARAMS_PER_INSERT: usize = 8192;

/// PostgreSQL-backed warehouse.
#[derive(Clone)]
pub struct PostgresWarehouse {
    pool: PgPool,
    schema: String,
}

impl PostgresWarehouse {
    /// Connect to PostgreSQL using the warehouse configuration.
    pub async fn connect(config: &WarehouseConfig) -> Result<Self, WarehouseError> {
        let url = config.connect_url().context(InvalidConfigSnafu)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&url)
            .await
            .context(ConnectSnafu)?;
        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    /// Create a warehouse from an existing connection pool.
    pub fn from_pool(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    /// Create the schema, ledger, and per-table target and staging tables
    /// if they don't exist.
    pub async fn ensure_schema(&self, specs: &[TableSpec]) -> Result<(), WarehouseError> {
        let schema = &self.schema;
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
            .execute(&self.pool)
            .await
            .context(QuerySnafu)?;
        sqlx::query(&sql::create_ledger(schema))
            .execute(&self.pool)
            .await
            .context(QuerySnafu)?;
        for spec in specs {
            sqlx::query(&sql::create_target(schema, spec))
                .execute(&self.pool)
                .await
                .context(QuerySnafu)?;
            sqlx::query(&sql::create_staging(schema, spec))
                .execute(&self.pool)
                .await
                .context(QuerySnafu)?;
        }
        info!(schema = %schema, tables = specs.len(), "Warehouse schema ensured");
        Ok(())
    }

    /// Bind one cell to a query, typed by the column's declared SQL type so
    /// that NULLs carry the right type.
    fn bind_cell<'q>(
        query: Query<'q, sqlx::Postgres, PgArguments>,
        value: &Value,
        sql_type: SqlType,
    ) -> Query<'q, sqlx::Postgres, PgArguments> {
        match value {
            Value::Null => match sql_type {
                SqlType::Text => query.bind(None::<String>),
                SqlType::Bigint => query.bind(None::<i64>),
                SqlType::Double => query.bind(None::<f64>),
                SqlType::Boolean => query.bind(None::<bool>),
            },
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.clone()),
        }
    }

    /// Write rows into the staging table in bounded-size batches.
    async fn stage_rows(&self, spec: &TableSpec, rows: &RowSet) -> Result<(), WarehouseError> {
        let width = spec.columns.len();
        let rows_per_batch = (MAX_PARAMS_PER_INSERT / width).max(1);

        for chunk in rows.rows.chunks(rows_per_batch) {
            let statement = sql::insert_staging(&self.schema, spec, chunk.len());
            let mut query = sqlx::query(&statement);
            for row in chunk {
                for (value, column) in row.iter().zip(&spec.columns) {
                    query = Self::bind_cell(query, value, column.sql_type);
                }
            }
            query.execute(&self.pool).await.context(QuerySnafu)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    async fn is_loaded(&self, snapshot: &SnapshotId) -> Result<bool, WarehouseError> {
        let row = sqlx::query(&sql::ledger_contains(&self.schema))
            .bind(snapshot.as_str())
            .fetch_optional(&self.pool)
            .await
            .context(QuerySnafu)?;
        Ok(row.is_some())
    }

    async fn mark_loaded(&self, snapshot: &SnapshotId) -> Result<(), WarehouseError> {
        sqlx::query(&sql::ledger_insert(&self.schema))
            .bind(snapshot.as_str())
            .execute(&self.pool)
            .await
            .context(QuerySnafu)?;
        Ok(())
    }

    async fn loaded_set(&self) -> Result<HashSet<String>, WarehouseError> {
        let rows = sqlx::query(&sql::ledger_select_all(&self.schema))
            .fetch_all(&self.pool)
            .await
            .context(QuerySnafu)?;
        Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect())
    }

    async fn merge_table(&self, spec: &TableSpec, rows: &RowSet) -> Result<u64, WarehouseError> {
        // Staging always starts empty; rows left behind by a crashed run
        // must not leak into this merge.
        sqlx::query(&sql::truncate_staging(&self.schema, spec))
            .execute(&self.pool)
            .await
            .context(QuerySnafu)?;

        if rows.is_empty() {
            debug!(table = %spec.name, "No rows to merge");
            return Ok(0);
        }

        self.stage_rows(spec, rows).await?;

        // Upsert and staging truncate commit together or not at all.
        let mut tx = self.pool.begin().await.context(QuerySnafu)?;
        let result = sqlx::query(&sql::upsert_from_staging(&self.schema, spec))
            .execute(&mut *tx)
            .await
            .context(QuerySnafu)?;
        sqlx::query(&sql::truncate_staging(&self.schema, spec))
            .execute(&mut *tx)
            .await
            .context(QuerySnafu)?;
        tx.commit().await.context(QuerySnafu)?;

        debug!(table = %spec.name, rows = result.rows_affected(), "Merged table");
        Ok(result.rows_affected())
    }
}

impl std::fmt::Debug for PostgresWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresWarehouse")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::IdFormat;
    use crate::tables::stripe_tables;

    fn get_database_url() -> Option<String> {
        std::env::var("DATABASE_URL").ok()
    }

    async fn connect() -> PostgresWarehouse {
        let url = get_database_url().expect("DATABASE_URL not set");
        let pool = PgPool::connect(&url).await.expect("failed to connect");
        let warehouse = PostgresWarehouse::from_pool(pool, "glacier_test");
        warehouse
            .ensure_schema(&stripe_tables())
            .await
            .expect("ensure_schema failed");
        warehouse
    }

    fn products_rows(pairs: &[(&str, &str)]) -> RowSet {
        let mut rows = RowSet::new(vec!["id".to_string(), "name".to_string()]);
        for (id, name) in pairs {
            rows.rows.push(vec![
                Value::Text(id.to_string()),
                Value::Text(name.to_string()),
            ]);
        }
        rows
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn ledger_roundtrip() {
        let warehouse = connect().await;
        let snapshot = SnapshotId::parse("2091010100", IdFormat::Numeric).unwrap();

        assert!(!warehouse.is_loaded(&snapshot).await.unwrap());
        warehouse.mark_loaded(&snapshot).await.unwrap();
        assert!(warehouse.is_loaded(&snapshot).await.unwrap());

        // Marking again is a no-op, not an error
        warehouse.mark_loaded(&snapshot).await.unwrap();
        let set = warehouse.loaded_set().await.unwrap();
        assert_eq!(set.iter().filter(|s| *s == "2091010100").count(), 1);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn merge_is_idempotent() {
        let warehouse = connect().await;
        let spec = stripe_tables()
            .into_iter()
            .find(|s| s.name == "products")
            .unwrap();

        let rows = products_rows(&[("prod_merge_1", "Starter"), ("prod_merge_2", "Scale")]);
        warehouse.merge_table(&spec, &rows).await.unwrap();
        warehouse.merge_table(&spec, &rows).await.unwrap();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM glacier_test.products WHERE id LIKE 'prod_merge_%'",
        )
        .fetch_one(&warehouse.pool)
        .await
        .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn merge_overwrites_non_key_columns() {
        let warehouse = connect().await;
        let spec = stripe_tables()
            .into_iter()
            .find(|s| s.name == "products")
            .unwrap();

        warehouse
            .merge_table(&spec, &products_rows(&[("prod_rename", "Old name")]))
            .await
            .unwrap();
        warehouse
            .merge_table(&spec, &products_rows(&[("prod_rename", "New name")]))
            .await
            .unwrap();

        let name: String = sqlx::query_scalar(
            "SELECT name FROM glacier_test.products WHERE id = 'prod_rename'",
        )
        .fetch_one(&warehouse.pool)
        .await
        .unwrap();
        assert_eq!(name, "New name");
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn staging_left_empty_after_merge() {
        let warehouse = connect().await;
        let spec = stripe_tables()
            .into_iter()
            .find(|s| s.name == "products")
            .unwrap();

        warehouse
            .merge_table(&spec, &products_rows(&[("prod_staging", "Probe")]))
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM glacier_test.staging_products")
            .fetch_one(&warehouse.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
