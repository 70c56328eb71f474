//! One-shot sync command.

use anyhow::Result;
use clap::Args;

use casesync_core::SyncConfig;

use super::build_engine;
use crate::output;

#[derive(Args)]
pub struct SyncArgs {
    /// Ignore the watermark and replicate every record since the epoch
    #[arg(long)]
    pub full: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: SyncArgs, mut config: SyncConfig) -> Result<()> {
    if args.full {
        config.full_resync = true;
    }
    let engine = build_engine(config)?;
    let report = engine.run_once().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_report(&report);
    }

    let unreplicated = engine.pending_records().len() + report.abandoned.len();
    if unreplicated > 0 {
        anyhow::bail!(incomplete_message(report.failures.len(), unreplicated));
    }
    Ok(())
}

/// A one-shot process has no later run to retry in.
fn incomplete_message(failed_partitions: usize, pending_records: usize) -> String {
    format!(
        "{} partition write(s) failed, {} record(s) not fully replicated; \
         the retry ledger does not outlive this process, re-run with `casesync sync --full` \
         to replicate them",
        failed_partitions, pending_records
    )
}
