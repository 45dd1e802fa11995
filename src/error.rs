//! Error types for the glacier snapshot loader.

use snafu::prelude::*;

/// Errors that can occur during object storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[snafu(context(false))]
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Bucket URL is empty.
    #[snafu(display("Storage bucket URL cannot be empty"))]
    EmptyBucketUrl,

    /// No tables configured.
    #[snafu(display("At least one table must be configured"))]
    NoTables,

    /// Duplicate table name in configuration.
    #[snafu(display("Duplicate table name in configuration: {name}"))]
    DuplicateTable { name: String },

    /// Table name is not among the configured specs.
    #[snafu(display("Unknown table: {name}"))]
    UnknownTable { name: String },

    /// Warehouse schema name is not a valid identifier.
    #[snafu(display("Invalid warehouse schema name: {name}"))]
    InvalidSchemaName { name: String },

    /// Warehouse connection settings cannot form a connection URL.
    #[snafu(display("Invalid warehouse connection settings: {message}"))]
    InvalidConnection { message: String },

    /// A table descriptor failed validation.
    #[snafu(display("Invalid table descriptor for '{table}': {message}"))]
    InvalidTableSpec { table: String, message: String },
}

/// Errors that can occur while extracting rows from snapshot Parquet files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExtractError {
    /// No Parquet files found for the table in this snapshot.
    #[snafu(display("No Parquet files for table '{table}' in snapshot {snapshot}"))]
    NoFiles { table: String, snapshot: String },

    /// Failed to read a Parquet file from storage.
    #[snafu(display("Failed to read {path}: {source}"))]
    ReadFile { path: String, source: StorageError },

    /// Failed to list the table's snapshot path.
    #[snafu(display("Failed to list files for table '{table}': {source}"))]
    ListFiles { table: String, source: StorageError },

    /// Parquet decoding failed.
    #[snafu(display("Failed to decode Parquet file {path}: {source}"))]
    Parquet {
        path: String,
        source: parquet::errors::ParquetError,
    },

    /// Arrow error while reading record batches.
    #[snafu(display("Failed to read record batch from {path}: {source}"))]
    Arrow {
        path: String,
        source: arrow::error::ArrowError,
    },

    /// A projected column is missing from the source file.
    #[snafu(display("Column '{column}' not found in snapshot files for table '{table}'"))]
    ColumnMissing { table: String, column: String },

    /// A projected column has a type we cannot convert.
    #[snafu(display("Unsupported Arrow type {data_type} for column '{column}'"))]
    UnsupportedType { column: String, data_type: String },
}

/// Errors that can occur against the warehouse (ledger, staging, merge).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WarehouseError {
    /// Connection settings were rejected before a connection was attempted.
    #[snafu(display("Invalid warehouse configuration: {source}"))]
    InvalidConfig { source: ConfigError },

    /// Failed to connect to the warehouse.
    #[snafu(display("Failed to connect to warehouse: {source}"))]
    Connect { source: sqlx::Error },

    /// A query against the warehouse failed.
    #[snafu(display("Warehouse query failed: {source}"))]
    Query { source: sqlx::Error },

    /// Internal error (used by the in-memory implementation).
    #[snafu(display("Warehouse internal error: {message}"))]
    Internal { message: String },
}

/// Top-level pipeline errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Storage error.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// Warehouse error.
    #[snafu(display("Warehouse error: {source}"))]
    Warehouse { source: WarehouseError },
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<StorageError> for PipelineError {
    fn from(source: StorageError) -> Self {
        PipelineError::Storage { source }
    }
}

impl From<WarehouseError> for PipelineError {
    fn from(source: WarehouseError) -> Self {
        PipelineError::Warehouse { source }
    }
}
