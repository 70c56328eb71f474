//! Web server command.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use casesync_core::SyncConfig;
use casesync_graph::sync::spawn_periodic;

use super::build_engine;

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "80")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Also write logs to a file
    #[arg(long)]
    pub log: bool,

    /// Log file path (defaults to ./casesync.log)
    #[arg(long, requires = "log")]
    pub log_file: Option<PathBuf>,
}

pub async fn execute(args: ServeArgs, config: SyncConfig) -> Result<()> {
    let auto_start = config.auto_start;
    let period = config.schedule.period();
    let schedule = config.schedule.expr().to_string();
    let engine = build_engine(config)?;

    println!();
    println!("  {} {}", "casesync".cyan().bold(), "Sync service".bold());
    println!();
    println!(
        "  {}    http://{}:{}/start-sync",
        "Trigger".green(),
        args.host,
        args.port
    );
    if auto_start {
        println!("  {}   {}", "Schedule".green(), schedule);
    } else {
        println!("  {}   {}", "Schedule".green(), "off (manual only)".dimmed());
    }
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();

    let periodic = auto_start.then(|| spawn_periodic(engine.clone(), period));

    let served = casesync_web::run_server(engine, &args.host, args.port).await;
    if let Some(handle) = periodic {
        handle.abort();
    }
    served
}
