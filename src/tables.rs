//! Declarative per-table schema descriptors.
//!
//! Each logical table is described by a [`TableSpec`]: the column projection
//! read from the snapshot Parquet files, the SQL types of the warehouse
//! columns, and the conflict key used for the idempotent upsert. The
//! extractor and merge engine are generic over the descriptor, so adding a
//! table is a configuration change rather than a code change.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// SQL column type for the warehouse tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlType {
    Text,
    Bigint,
    Double,
    Boolean,
}

impl SqlType {
    /// The Postgres DDL name for this type.
    pub fn ddl(self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Bigint => "BIGINT",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Boolean => "BOOLEAN",
        }
    }
}

/// A single projected column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name, identical in the Parquet files and the warehouse.
    pub name: String,
    /// Warehouse column type.
    #[serde(rename = "type")]
    pub sql_type: SqlType,
}

/// Descriptor for one logical table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    /// Logical table name (also the folder name under the snapshot prefix).
    pub name: String,
    /// Fixed column projection, in warehouse column order.
    pub columns: Vec<ColumnSpec>,
    /// Conflict key column(s) for the upsert.
    pub key: Vec<String>,
}

impl TableSpec {
    /// Name of the per-table staging table.
    pub fn staging_name(&self) -> String {
        format!("staging_{}", self.name)
    }

    /// Column names in projection order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Columns that are not part of the conflict key.
    pub fn non_key_columns(&self) -> Vec<&ColumnSpec> {
        self.columns
            .iter()
            .filter(|c| !self.key.iter().any(|k| k == &c.name))
            .collect()
    }

    /// Validate the descriptor.
    ///
    /// Names are interpolated into SQL as identifiers, so they are restricted
    /// to lowercase identifier characters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_identifier(&self.name) {
            return Err(ConfigError::InvalidTableSpec {
                table: self.name.clone(),
                message: "table name must be a lowercase SQL identifier".to_string(),
            });
        }
        if self.columns.is_empty() {
            return Err(ConfigError::InvalidTableSpec {
                table: self.name.clone(),
                message: "column projection cannot be empty".to_string(),
            });
        }
        for column in &self.columns {
            if !is_identifier(&column.name) {
                return Err(ConfigError::InvalidTableSpec {
                    table: self.name.clone(),
                    message: format!("column '{}' is not a valid SQL identifier", column.name),
                });
            }
        }
        if self.key.is_empty() {
            return Err(ConfigError::InvalidTableSpec {
                table: self.name.clone(),
                message: "conflict key cannot be empty".to_string(),
            });
        }
        for key in &self.key {
            if !self.columns.iter().any(|c| &c.name == key) {
                return Err(ConfigError::InvalidTableSpec {
                    table: self.name.clone(),
                    message: format!("key column '{key}' is not in the projection"),
                });
            }
        }
        Ok(())
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Find a table descriptor by name.
pub fn find<'a>(specs: &'a [TableSpec], name: &str) -> Result<&'a TableSpec, ConfigError> {
    specs
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| ConfigError::UnknownTable {
            name: name.to_string(),
        })
}

fn column(name: &str, sql_type: SqlType) -> ColumnSpec {
    ColumnSpec {
        name: name.to_string(),
        sql_type,
    }
}

/// Default table set for the Stripe snapshot exports.
pub fn stripe_tables() -> Vec<TableSpec> {
    vec![
        TableSpec {
            name: "charges".to_string(),
            columns: vec![
                column("id", SqlType::Text),
                column("status", SqlType::Text),
                column("invoice_id", SqlType::Text),
                column("created", SqlType::Bigint),
                column("currency", SqlType::Text),
                column("amount", SqlType::Bigint),
            ],
            key: vec!["id".to_string()],
        },
        TableSpec {
            name: "invoice_line_items".to_string(),
            columns: vec![
                column("id", SqlType::Text),
                column("invoice_id", SqlType::Text),
                column("price_id", SqlType::Text),
            ],
            key: vec!["id".to_string()],
        },
        TableSpec {
            name: "prices".to_string(),
            columns: vec![
                column("id", SqlType::Text),
                column("product_id", SqlType::Text),
            ],
            key: vec!["id".to_string()],
        },
        TableSpec {
            name: "products".to_string(),
            columns: vec![column("id", SqlType::Text), column("name", SqlType::Text)],
            key: vec!["id".to_string()],
        },
    ]
}
