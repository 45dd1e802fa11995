//! Snapshot discovery.
//!
//! Snapshots are top-level folders in the bucket named by the upstream
//! export job, either a fixed-width numeric token (`2025070103`, hour
//! resolution) or an ISO calendar date (`2025-07-01`). A snapshot is only
//! a candidate once its completion marker exists, which signals that the
//! export finished writing.

use object_store::path::Path;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StorageError;
use crate::storage::SnapshotStore;

/// Identifier format used by the upstream export job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdFormat {
    /// 10-digit numeric token, `YYYYMMDDHH`.
    #[default]
    Numeric,
    /// ISO calendar date, `YYYY-MM-DD`.
    Date,
}

/// A validated snapshot identifier.
///
/// The fixed-width formats make lexicographic order equal to chronological
/// order, which `latest` selection and the load ledger rely on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Parse a folder name as a snapshot identifier.
    pub fn parse(raw: &str, format: IdFormat) -> Option<Self> {
        let valid = match format {
            IdFormat::Numeric => raw.len() == 10 && raw.bytes().all(|b| b.is_ascii_digit()),
            IdFormat::Date => {
                chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok() && raw.len() == 10
            }
        };
        valid.then(|| Self(raw.to_string()))
    }

    /// The raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier's calendar-day prefix as `YYYYMMDD`.
    pub fn date_prefix(&self) -> String {
        if self.0.contains('-') {
            self.0.replace('-', "")
        } else {
            self.0[..8].to_string()
        }
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Discovers completed snapshot folders in the bucket.
pub struct SnapshotDirectoryReader<'a> {
    storage: &'a SnapshotStore,
    format: IdFormat,
    live_prefix: &'a str,
    completion_marker: &'a str,
}

impl<'a> SnapshotDirectoryReader<'a> {
    pub fn new(
        storage: &'a SnapshotStore,
        format: IdFormat,
        live_prefix: &'a str,
        completion_marker: &'a str,
    ) -> Self {
        Self {
            storage,
            format,
            live_prefix,
            completion_marker,
        }
    }

    /// Path of the completion marker within a snapshot folder.
    fn marker_path(&self, id: &SnapshotId) -> Path {
        Path::from(format!(
            "{}/{}/{}",
            id.as_str(),
            self.live_prefix,
            self.completion_marker
        ))
    }

    /// List completed snapshot identifiers in ascending order.
    ///
    /// Folders that do not match the identifier format, or whose completion
    /// marker is absent, are skipped.
    pub async fn list_completed(&self) -> Result<Vec<SnapshotId>, StorageError> {
        let dirs = self.storage.list_top_level_dirs().await?;

        let mut completed = Vec::new();
        for dir in dirs {
            let Some(id) = SnapshotId::parse(&dir, self.format) else {
                continue;
            };
            if self.storage.exists(&self.marker_path(&id)).await? {
                completed.push(id);
            } else {
                debug!(snapshot = %id, "Skipping snapshot without completion marker");
            }
        }

        completed.sort();
        Ok(completed)
    }

    /// The most recent completed snapshot, if any.
    pub async fn latest(&self) -> Result<Option<SnapshotId>, StorageError> {
        Ok(self.list_completed().await?.pop())
    }
}
