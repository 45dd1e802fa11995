//! Glacier CLI: incremental loader for Stripe Parquet snapshots.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};

use glacier::{
    Config, Pipeline, PostgresWarehouse, RunMode, RunOutcome, SnapshotStore, TableOutcome,
    init_tracing,
};

#[derive(Parser, Debug)]
#[command(version)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "glacier.yaml")]
    pub config: PathBuf,

    /// Process every unloaded completed snapshot instead of only the latest
    #[arg(long)]
    pub backlog: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    let mut config = match Config::from_file(&args.config.to_string_lossy()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };
    if args.backlog {
        config.pipeline.mode = RunMode::Backlog;
    }

    info!(
        bucket = %config.storage.bucket_url,
        tables = config.tables.len(),
        mode = ?config.pipeline.mode,
        "Starting glacier snapshot loader"
    );

    let storage = match SnapshotStore::for_url_with_options(
        &config.storage.bucket_url,
        config.storage.storage_options.clone(),
    ) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open snapshot bucket: {e}");
            return ExitCode::FAILURE;
        }
    };

    let warehouse = match PostgresWarehouse::connect(&config.warehouse).await {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Failed to connect to warehouse: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = warehouse.ensure_schema(&config.tables).await {
        eprintln!("Failed to prepare warehouse schema: {e}");
        return ExitCode::FAILURE;
    }

    let pipeline = Pipeline::new(&storage, &warehouse, &config);
    match pipeline.run().await {
        Ok(outcome) => report(&outcome),
        Err(e) => {
            eprintln!("Pipeline failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Log the run outcome. Per-table failures are reported but do not fail the
/// process; the snapshot is in the ledger and the failures need operator
/// follow-up rather than a blind retry.
fn report(outcome: &RunOutcome) -> ExitCode {
    match outcome {
        RunOutcome::NoSnapshot => {
            info!("No completed snapshot to process");
        }
        RunOutcome::AlreadyProcessed { snapshot } => {
            info!(snapshot = %snapshot, "Snapshot already loaded");
        }
        RunOutcome::Loaded { reports, sweep } => {
            for report in reports {
                for table in &report.tables {
                    match &table.outcome {
                        TableOutcome::Merged { rows } => {
                            info!(snapshot = %report.snapshot, table = %table.table, rows, "Loaded");
                        }
                        TableOutcome::Failed { message } => {
                            warn!(snapshot = %report.snapshot, table = %table.table, %message, "Failed");
                        }
                    }
                }
            }
            if let Some(sweep) = sweep {
                info!(
                    deleted_folders = sweep.deleted_folders.len(),
                    deleted_objects = sweep.deleted_objects,
                    "Retention sweep complete"
                );
            }
        }
    }
    ExitCode::SUCCESS
}
