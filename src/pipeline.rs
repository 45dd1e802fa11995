//! Pipeline controller: discovery, per-table merge, ledger, sweep.
//!
//! One `run` processes either the latest completed snapshot or the whole
//! unprocessed backlog, depending on configuration. Table failures are
//! isolated: a failed extract or merge is recorded in the run report and
//! the remaining tables still load. Ledger and discovery failures abort
//! the run.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::config::{Config, RunMode};
use crate::error::PipelineError;
use crate::extract::SnapshotExtractor;
use crate::snapshot::{SnapshotDirectoryReader, SnapshotId};
use crate::storage::SnapshotStore;
use crate::sweep::{RetentionSweeper, SweepReport};
use crate::warehouse::Warehouse;

/// Result of loading one table from one snapshot.
#[derive(Debug)]
pub enum TableOutcome {
    /// The table was staged and upserted.
    Merged { rows: u64 },
    /// Extract or merge failed; other tables were unaffected.
    Failed { message: String },
}

/// Per-table entry in a run report.
#[derive(Debug)]
pub struct TableReport {
    pub table: String,
    pub outcome: TableOutcome,
}

/// Report for one loaded snapshot.
#[derive(Debug)]
pub struct RunReport {
    pub snapshot: SnapshotId,
    pub tables: Vec<TableReport>,
}

impl RunReport {
    /// Tables whose load failed.
    pub fn failed(&self) -> Vec<&TableReport> {
        self.tables
            .iter()
            .filter(|t| matches!(t.outcome, TableOutcome::Failed { .. }))
            .collect()
    }

    /// True iff every table merged.
    pub fn is_clean(&self) -> bool {
        self.failed().is_empty()
    }
}

/// Overall outcome of one pipeline invocation.
#[derive(Debug)]
pub enum RunOutcome {
    /// No completed snapshot exists in the bucket.
    NoSnapshot,
    /// Every candidate snapshot was already in the ledger; nothing loaded,
    /// nothing swept.
    AlreadyProcessed { snapshot: SnapshotId },
    /// At least one snapshot was loaded.
    Loaded {
        reports: Vec<RunReport>,
        sweep: Option<SweepReport>,
    },
}

/// Drives one end-to-end run against a bucket and a warehouse.
pub struct Pipeline<'a> {
    storage: &'a SnapshotStore,
    warehouse: &'a dyn Warehouse,
    config: &'a Config,
}

impl<'a> Pipeline<'a> {
    pub fn new(storage: &'a SnapshotStore, warehouse: &'a dyn Warehouse, config: &'a Config) -> Self {
        Self {
            storage,
            warehouse,
            config,
        }
    }

    /// Run the pipeline using the current UTC date as the retention reference.
    pub async fn run(&self) -> Result<RunOutcome, PipelineError> {
        self.run_at(Utc::now().date_naive()).await
    }

    /// Run the pipeline with an explicit retention reference date.
    pub async fn run_at(&self, today: NaiveDate) -> Result<RunOutcome, PipelineError> {
        let storage_cfg = &self.config.storage;
        let reader = SnapshotDirectoryReader::new(
            self.storage,
            storage_cfg.id_format,
            &storage_cfg.live_prefix,
            &storage_cfg.completion_marker,
        );

        let candidates = match self.config.pipeline.mode {
            RunMode::Latest => reader.latest().await?.into_iter().collect(),
            RunMode::Backlog => reader.list_completed().await?,
        };
        if candidates.is_empty() {
            info!("No completed snapshot found");
            return Ok(RunOutcome::NoSnapshot);
        }

        let mut reports = Vec::new();
        let mut already_loaded = None;
        for snapshot in candidates {
            if self.warehouse.is_loaded(&snapshot).await? {
                info!(snapshot = %snapshot, "Snapshot already loaded, skipping");
                already_loaded = Some(snapshot);
                continue;
            }
            reports.push(self.load_snapshot(&snapshot).await?);
        }

        if reports.is_empty() {
            // Candidates were non-empty, so at least one was skipped.
            return match already_loaded {
                Some(snapshot) => Ok(RunOutcome::AlreadyProcessed { snapshot }),
                None => Ok(RunOutcome::NoSnapshot),
            };
        }

        let sweep = if self.config.pipeline.sweep.enabled {
            Some(self.sweep(today).await?)
        } else {
            None
        };

        Ok(RunOutcome::Loaded { reports, sweep })
    }

    /// Load every configured table from one snapshot, then record it in the
    /// ledger. The ledger insert happens even when some tables failed, so a
    /// partially loaded snapshot is not retried wholesale; failed tables are
    /// surfaced in the report for operator follow-up.
    async fn load_snapshot(&self, snapshot: &SnapshotId) -> Result<RunReport, PipelineError> {
        let extractor = SnapshotExtractor::new(self.storage, &self.config.storage.live_prefix);

        let mut tables = Vec::with_capacity(self.config.tables.len());
        for spec in &self.config.tables {
            let outcome = match extractor.extract(spec, snapshot).await {
                Ok(rows) => match self.warehouse.merge_table(spec, &rows).await {
                    Ok(rows) => {
                        info!(snapshot = %snapshot, table = %spec.name, rows, "Merged table");
                        TableOutcome::Merged { rows }
                    }
                    Err(e) => {
                        warn!(snapshot = %snapshot, table = %spec.name, error = %e, "Merge failed");
                        TableOutcome::Failed {
                            message: e.to_string(),
                        }
                    }
                },
                Err(e) => {
                    warn!(snapshot = %snapshot, table = %spec.name, error = %e, "Extract failed");
                    TableOutcome::Failed {
                        message: e.to_string(),
                    }
                }
            };
            tables.push(TableReport {
                table: spec.name.clone(),
                outcome,
            });
        }

        self.warehouse.mark_loaded(snapshot).await?;
        info!(snapshot = %snapshot, "Recorded snapshot in load ledger");

        Ok(RunReport {
            snapshot: snapshot.clone(),
            tables,
        })
    }

    async fn sweep(&self, today: NaiveDate) -> Result<SweepReport, PipelineError> {
        let policy = &self.config.pipeline.sweep;
        let loaded = if policy.require_loaded {
            self.warehouse.loaded_set().await?
        } else {
            HashSet::new()
        };
        let sweeper = RetentionSweeper::new(self.storage, self.config.storage.id_format, policy);
        Ok(sweeper.sweep(today, &loaded).await?)
    }
}
