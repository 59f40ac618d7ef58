use std::process::ExitCode;

use chrono::Local;
use clap::Parser;
use rt_scrap::{info_time, process_batch, ArchiveContext, IssuePipeline, Result};
use tokio_util::sync::CancellationToken;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod cli;

use cli::{Cli, Mode};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging(&cli) {
        eprintln!("Failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn initialize_logging(cli: &Cli) -> std::result::Result<(), SetGlobalDefaultError> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

/// Returns whether every requested issue ended up as a PDF.
async fn run(cli: Cli) -> Result<bool> {
    let start_time = Local::now();

    let (year, issues) = match cli.mode {
        Mode::Single { year, issue_number } => {
            info!("Running in single-issue mode");
            (year, issue_number..=issue_number)
        }
        Mode::Batch {
            year,
            start_issue,
            end_issue,
        } => {
            info!("Running in batch mode");
            (year, start_issue..=end_issue)
        }
    };

    let context = ArchiveContext::from_year(year);
    let pipeline = IssuePipeline::from_config(cli.config(), context)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling remaining issues...");
                cancel.cancel();
            }
        }
    });

    let report = process_batch(pipeline, &cli.region, issues, cancel).await?;
    info_time!(start_time, "Full program time:");

    Ok(report.all_succeeded())
}
