//! Historify CLI
//!
//! Commands:
//! - `collect` - fetch historical candles and write them to InfluxDB
//! - `sources` - list the exchange sources a config can name

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use historify_ingest::config::PipelineConfig;
use historify_ingest::error::ErrorResponse;
use historify_ingest::sources::{SourceOptions, SourceRegistry};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "historify", about = "Historical candle collector for InfluxDB v2")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch candles for every configured symbol and write them out.
    Collect {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
    /// List registered sources and their intervals.
    Sources,
}

#[tokio::main]
async fn main() -> ExitCode {
    historify_ingest::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Collect { config } => run_collect(config).await,
        Commands::Sources => run_sources(),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<historify_ingest::error::AppError>() {
                Some(app) => {
                    let report = ErrorResponse::from(app);
                    tracing::error!("{}: {:#}", report.code, e);
                }
                None => tracing::error!("{:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run_collect(path: PathBuf) -> Result<ExitCode> {
    let config = PipelineConfig::load(&path)
        .with_context(|| format!("failed to load config {}", path.display()))?;

    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler: never interrupt
            std::future::pending::<()>().await;
        }
    };

    let report = historify_ingest::run_from_config(&config, interrupt).await?;

    if !report.failed_symbols.is_empty() {
        tracing::warn!("Incomplete symbols: {}", report.failed_symbols.join(", "));
    }
    if report.interrupted {
        tracing::warn!(
            "Interrupted: {} queued candles were not written",
            report.worker.abandoned
        );
        return Ok(ExitCode::from(130));
    }
    Ok(ExitCode::SUCCESS)
}

fn run_sources() -> Result<ExitCode> {
    let registry = SourceRegistry::new();
    let opts = SourceOptions::default();

    for class in registry.list() {
        let source = registry.create(class, &opts)?;
        println!("{:<16} {:<16} {}", class, source.id(), source.intervals().join(" "));
    }
    Ok(ExitCode::SUCCESS)
}
