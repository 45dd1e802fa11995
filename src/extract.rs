//! Snapshot extraction: Parquet files to projected row sets.
//!
//! Reads the columnar files at `<snapshot>/<live_prefix>/<table>/*.parquet`
//! and returns the table's fixed column projection. No filtering or
//! aggregation happens here; every source row passes through.

use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use snafu::prelude::*;
use tracing::debug;

use crate::error::{
    ArrowSnafu, ExtractError, ListFilesSnafu, NoFilesSnafu, ParquetSnafu, ReadFileSnafu,
};
use crate::rows::{RowSet, Value};
use crate::snapshot::SnapshotId;
use crate::storage::SnapshotStore;
use crate::tables::TableSpec;

/// Reads per-table Parquet file sets out of a snapshot folder.
pub struct SnapshotExtractor<'a> {
    storage: &'a SnapshotStore,
    live_prefix: &'a str,
}

impl<'a> SnapshotExtractor<'a> {
    pub fn new(storage: &'a SnapshotStore, live_prefix: &'a str) -> Self {
        Self {
            storage,
            live_prefix,
        }
    }

    /// Extract the projected rows for one logical table from one snapshot.
    pub async fn extract(
        &self,
        spec: &TableSpec,
        snapshot: &SnapshotId,
    ) -> Result<RowSet, ExtractError> {
        let prefix = format!("{}/{}/{}", snapshot.as_str(), self.live_prefix, spec.name);
        let files: Vec<_> = self
            .storage
            .list_prefix(&prefix)
            .await
            .context(ListFilesSnafu { table: &spec.name })?
            .into_iter()
            .filter(|p| p.as_ref().ends_with(".parquet"))
            .collect();

        if files.is_empty() {
            return NoFilesSnafu {
                table: &spec.name,
                snapshot: snapshot.as_str(),
            }
            .fail();
        }

        let columns: Vec<String> = spec.columns.iter().map(|c| c.name.clone()).collect();
        let mut rows = RowSet::new(columns);

        for file in &files {
            let path = file.to_string();
            let bytes = self
                .storage
                .get(file)
                .await
                .context(ReadFileSnafu { path: &path })?;
            self.read_file(spec, &path, bytes, &mut rows)?;
        }

        debug!(
            table = %spec.name,
            snapshot = %snapshot,
            files = files.len(),
            rows = rows.len(),
            "Extracted snapshot table"
        );
        Ok(rows)
    }

    /// Decode one Parquet file, appending projected rows to `out`.
    fn read_file(
        &self,
        spec: &TableSpec,
        path: &str,
        bytes: Bytes,
        out: &mut RowSet,
    ) -> Result<(), ExtractError> {
        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
            .context(ParquetSnafu { path })?
            .build()
            .context(ParquetSnafu { path })?;

        for batch in reader {
            let batch = batch.context(ArrowSnafu { path })?;

            // Resolve the projection by name; extra source columns are dropped
            // and missing ones are an error.
            let mut indices = Vec::with_capacity(spec.columns.len());
            for column in &spec.columns {
                let index = batch.schema().index_of(&column.name).map_err(|_| {
                    ExtractError::ColumnMissing {
                        table: spec.name.clone(),
                        column: column.name.clone(),
                    }
                })?;
                indices.push(index);
            }
            let projected = batch.project(&indices).context(ArrowSnafu { path })?;

            for row in 0..projected.num_rows() {
                let mut values = Vec::with_capacity(spec.columns.len());
                for (i, column) in spec.columns.iter().enumerate() {
                    values.push(Value::from_array(
                        &column.name,
                        projected.column(i).as_ref(),
                        row,
                    )?);
                }
                out.rows.push(values);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use object_store::path::Path;
    use parquet::arrow::ArrowWriter;
    use tempfile::TempDir;

    use crate::snapshot::IdFormat;
    use crate::tables::{find, stripe_tables};

    fn create_test_storage(temp_dir: &TempDir) -> SnapshotStore {
        SnapshotStore::for_url_with_options(temp_dir.path().to_str().unwrap(), HashMap::new())
            .unwrap()
    }

    /// Encode a charges batch that carries extra columns beyond the projection.
    fn charges_parquet(ids: &[&str]) -> Vec<u8> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("status", DataType::Utf8, true),
            Field::new("invoice_id", DataType::Utf8, true),
            Field::new("created", DataType::Int64, true),
            Field::new("currency", DataType::Utf8, true),
            Field::new("amount", DataType::Int64, true),
            Field::new("customer_email", DataType::Utf8, true),
        ]));
        let n = ids.len();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(ids.to_vec())),
                Arc::new(StringArray::from(vec!["succeeded"; n])),
                Arc::new(StringArray::from(vec!["in_1"; n])),
                Arc::new(Int64Array::from(vec![1_751_328_000i64; n])),
                Arc::new(StringArray::from(vec!["cad"; n])),
                Arc::new(Int64Array::from(vec![1999i64; n])),
                Arc::new(StringArray::from(vec!["a@b.c"; n])),
            ],
        )
        .unwrap();

        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
        buffer
    }

    async fn write_snapshot_file(storage: &SnapshotStore, path: &str, bytes: Vec<u8>) {
        storage.put(&Path::from(path), bytes).await.unwrap();
    }

    #[tokio::test]
    async fn test_projection_fidelity() {
        let temp_dir = TempDir::new().unwrap();
        let storage = create_test_storage(&temp_dir);
        write_snapshot_file(
            &storage,
            "2025070100/livemode/charges/part-0.parquet",
            charges_parquet(&["ch_1", "ch_2"]),
        )
        .await;

        let specs = stripe_tables();
        let charges = find(&specs, "charges").unwrap();
        let snapshot = SnapshotId::parse("2025070100", IdFormat::Numeric).unwrap();

        let rows = SnapshotExtractor::new(&storage, "livemode")
            .extract(charges, &snapshot)
            .await
            .unwrap();

        // Exactly the configured projection, regardless of extra source columns
        assert_eq!(
            rows.columns,
            vec!["id", "status", "invoice_id", "created", "currency", "amount"]
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.rows[0][0], Value::Text("ch_1".to_string()));
        assert_eq!(rows.rows[0][5], Value::Int(1999));
    }

    #[tokio::test]
    async fn test_multiple_files_concatenated() {
        let temp_dir = TempDir::new().unwrap();
        let storage = create_test_storage(&temp_dir);
        write_snapshot_file(
            &storage,
            "2025070100/livemode/charges/part-0.parquet",
            charges_parquet(&["ch_1"]),
        )
        .await;
        write_snapshot_file(
            &storage,
            "2025070100/livemode/charges/part-1.parquet",
            charges_parquet(&["ch_2", "ch_3"]),
        )
        .await;

        let specs = stripe_tables();
        let charges = find(&specs, "charges").unwrap();
        let snapshot = SnapshotId::parse("2025070100", IdFormat::Numeric).unwrap();

        let rows = SnapshotExtractor::new(&storage, "livemode")
            .extract(charges, &snapshot)
            .await
            .unwrap();

        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn test_no_files_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = create_test_storage(&temp_dir);

        let specs = stripe_tables();
        let charges = find(&specs, "charges").unwrap();
        let snapshot = SnapshotId::parse("2025070100", IdFormat::Numeric).unwrap();

        let err = SnapshotExtractor::new(&storage, "livemode")
            .extract(charges, &snapshot)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::NoFiles { .. }));
    }

    #[tokio::test]
    async fn test_missing_column_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = create_test_storage(&temp_dir);
        // products projection expects (id, name); write a charges-shaped file
        write_snapshot_file(
            &storage,
            "2025070100/livemode/products/part-0.parquet",
            charges_parquet(&["prod_1"]),
        )
        .await;

        let specs = stripe_tables();
        let products = find(&specs, "products").unwrap();
        let snapshot = SnapshotId::parse("2025070100", IdFormat::Numeric).unwrap();

        let err = SnapshotExtractor::new(&storage, "livemode")
            .extract(products, &snapshot)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::ColumnMissing { column, .. } if column == "name"));
    }

    #[tokio::test]
    async fn test_non_parquet_objects_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let storage = create_test_storage(&temp_dir);
        write_snapshot_file(
            &storage,
            "2025070100/livemode/charges/part-0.parquet",
            charges_parquet(&["ch_1"]),
        )
        .await;
        write_snapshot_file(
            &storage,
            "2025070100/livemode/charges/_manifest.json",
            b"{}".to_vec(),
        )
        .await;

        let specs = stripe_tables();
        let charges = find(&specs, "charges").unwrap();
        let snapshot = SnapshotId::parse("2025070100", IdFormat::Numeric).unwrap();

        let rows = SnapshotExtractor::new(&storage, "livemode")
            .extract(charges, &snapshot)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
