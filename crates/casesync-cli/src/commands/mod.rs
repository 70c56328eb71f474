//! CLI command definitions and handlers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use casesync_core::SyncConfig;
use casesync_graph::{HttpGateway, RetryPolicy, Retrying, RunGuard, SyncEngine};

pub mod serve;
pub mod status;
pub mod sync;

/// Incremental case replication into per-organization graphs
#[derive(Parser)]
#[command(name = "casesync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a TOML config file (defaults to ./casesync.toml when present)
    #[arg(short, long, global = true, env = "CASESYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP trigger and run the periodic sync
    Serve(serve::ServeArgs),

    /// Run one sync in the foreground
    ///
    /// Records whose writes fail are only retried within a long-running
    /// `serve` process; after a failed one-shot run, re-run with `--full`.
    Sync(sync::SyncArgs),

    /// Show the effective configuration and current watermark
    Status,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = SyncConfig::load(self.config.as_deref())
            .context("failed to load configuration")?;

        match self.command {
            Commands::Serve(args) => serve::execute(args, config).await,
            Commands::Sync(args) => sync::execute(args, config).await,
            Commands::Status => status::execute(config).await,
        }
    }
}

/// Wire the HTTP gateway, retry layer and run guard into an engine.
pub fn build_engine(config: SyncConfig) -> Result<Arc<SyncEngine>> {
    let http = HttpGateway::from_config(&config)?;
    let gateway = Retrying::new(Arc::new(http), RetryPolicy::from_settings(&config.retry));
    Ok(Arc::new(SyncEngine::new(
        Arc::new(gateway),
        Arc::new(config),
        RunGuard::new(),
    )))
}
