// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ndxi::batch::process_batch;
use ndxi::cli::{Cli, Commands};
use ndxi::IndexProcessor;

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ndxi={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Batch { config } = &cli.command {
        let summaries = process_batch(config)?;
        println!("Batch processing complete: {} jobs", summaries.len());
        return Ok(());
    }

    let job = cli
        .index_job()
        .context("No index job on the command line")?;
    let processor = IndexProcessor::new(cli.processing_options());
    let summary = processor
        .process(&job)
        .with_context(|| format!("Failed to compute {}", job.spec.name()))?;

    for output in &summary.outputs {
        println!("Processing complete: {}", output.display());
    }
    Ok(())
}
