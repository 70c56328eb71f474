//! Terminal output formatting.

use colored::{ColoredString, Colorize};

use casesync_graph::{RunOutcome, SyncReport};

fn outcome_label(outcome: RunOutcome) -> ColoredString {
    match outcome {
        RunOutcome::NoNewRecords => "no new records".dimmed(),
        RunOutcome::Completed => "completed".green(),
        RunOutcome::PartiallyFailed => "partially failed".red(),
    }
}

/// Print a run report.
pub fn print_report(report: &SyncReport) {
    println!(
        "{} {}",
        "Sync run".cyan().bold(),
        format!("({})", report.run_id).dimmed()
    );
    println!();
    println!("{}: {}", "Outcome".bold(), outcome_label(report.outcome));
    if let Some(watermark) = report.watermark {
        println!("{}: {}", "Watermark".bold(), watermark.to_rfc3339());
    }
    println!(
        "{}: {} ({} retried)",
        "Records".bold(),
        report.records.len(),
        report.retried_records
    );
    println!(
        "{}: {} partitions, {} statements",
        "Written".bold(),
        report.partitions_written,
        report.statements_written
    );

    if report.unattributed > 0 || report.unsupported > 0 {
        println!(
            "{}: {} unattributed, {} unsupported",
            "Dropped".bold(),
            report.unattributed.to_string().yellow(),
            report.unsupported.to_string().yellow()
        );
    }

    if !report.failures.is_empty() {
        println!();
        println!("{}", "Failed partitions".bold());
        for failure in &report.failures {
            println!("  {} {}", failure.graph.red(), failure.error.dimmed());
        }
    }

    if !report.abandoned.is_empty() {
        println!();
        println!("{}", "Abandoned records".bold());
        for record in &report.abandoned {
            println!("  {}", record.red());
        }
    }
}
