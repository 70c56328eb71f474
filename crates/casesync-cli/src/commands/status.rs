//! Configuration and watermark status.

use anyhow::Result;
use colored::Colorize;

use casesync_core::{SourceMode, SyncConfig};

use super::build_engine;

pub async fn execute(config: SyncConfig) -> Result<()> {
    println!("{}", "casesync status".cyan().bold());
    println!();

    match config.source() {
        SourceMode::Remote { endpoint } => {
            println!("{}: {} ({})", "Source".bold(), endpoint, "remote".green())
        }
        SourceMode::Mock { graph } => {
            println!("{}: {} ({})", "Source".bold(), graph, "mock".yellow())
        }
    }
    println!("{}: {}", "Local store".bold(), config.local_endpoint);
    println!("{}: {}", "Partitions".bold(), config.organization_graph_prefix);
    println!("{}: {}", "Page size".bold(), config.page_size);
    println!("{}: {}", "Epoch".bold(), config.epoch.to_rfc3339());
    println!(
        "{}: {} ({})",
        "Schedule".bold(),
        config.schedule.expr(),
        if config.auto_start {
            "auto".green()
        } else {
            "manual".dimmed()
        }
    );
    if config.full_resync {
        println!("{}: {}", "Full resync".bold(), "on".yellow());
    }

    let engine = build_engine(config)?;
    println!();
    match engine.current_watermark().await {
        Ok(watermark) => println!("{}: {}", "Watermark".bold(), watermark.to_rfc3339()),
        Err(e) => println!("{}: {}", "Watermark".bold(), format!("unavailable ({})", e).red()),
    }

    Ok(())
}
