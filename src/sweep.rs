//! Retention sweep: prune snapshot folders from prior processing days.
//!
//! Deletion eligibility is date-based: any snapshot-shaped folder whose
//! calendar-day prefix differs from the reference date is a candidate. The
//! folder matching the reference date is never touched. With
//! `require_loaded` set (the default), candidates must also appear in the
//! load ledger, so a snapshot that was never processed survives the sweep.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::SweepConfig;
use crate::error::StorageError;
use crate::snapshot::{IdFormat, SnapshotId};
use crate::storage::SnapshotStore;

/// Outcome of one sweep pass.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Folders whose objects were deleted.
    pub deleted_folders: Vec<String>,
    /// Total objects deleted across all folders.
    pub deleted_objects: usize,
    /// Folders retained (reference date, un-loaded, or delete failure).
    pub retained_folders: Vec<String>,
}

/// Deletes stale snapshot folders.
pub struct RetentionSweeper<'a> {
    storage: &'a SnapshotStore,
    format: IdFormat,
    policy: &'a SweepConfig,
}

impl<'a> RetentionSweeper<'a> {
    pub fn new(storage: &'a SnapshotStore, format: IdFormat, policy: &'a SweepConfig) -> Self {
        Self {
            storage,
            format,
            policy,
        }
    }

    /// Sweep folders older than `reference` (the current processing day, UTC).
    ///
    /// `loaded` is the ledger's snapshot set, consulted only when the policy
    /// requires it. A failed deletion is logged and does not halt sweeping of
    /// the remaining folders.
    pub async fn sweep(
        &self,
        reference: NaiveDate,
        loaded: &HashSet<String>,
    ) -> Result<SweepReport, StorageError> {
        let reference_prefix = reference.format("%Y%m%d").to_string();
        let dirs = self.storage.list_top_level_dirs().await?;

        let mut report = SweepReport::default();
        for dir in dirs {
            let Some(id) = SnapshotId::parse(&dir, self.format) else {
                continue;
            };
            if id.date_prefix() == reference_prefix {
                report.retained_folders.push(dir);
                continue;
            }
            if self.policy.require_loaded && !loaded.contains(id.as_str()) {
                warn!(snapshot = %id, "Retaining stale folder that was never loaded");
                report.retained_folders.push(dir);
                continue;
            }

            match self.storage.delete_prefix(id.as_str()).await {
                Ok(count) => {
                    info!(snapshot = %id, objects = count, "Deleted old snapshot folder");
                    report.deleted_objects += count;
                    report.deleted_folders.push(dir);
                }
                Err(e) => {
                    warn!(snapshot = %id, error = %e, "Failed to delete snapshot folder");
                    report.retained_folders.push(dir);
                }
            }
        }

        Ok(report)
    }
}
