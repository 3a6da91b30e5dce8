//! PaperLink Ingestion
//!
//! Turns parser output into persisted document graphs:
//! 1. Reads a parsed-document JSON file (or every one in a directory)
//! 2. Builds the section tree
//! 3. Chunks every section with overlap and block provenance
//! 4. Validates and writes `<output>/<doc_id>/graph.json`

use anyhow::Context;
use clap::Parser;
use paperlink_common::config::{AppConfig, ObservabilityConfig};
use paperlink_common::{metrics, VERSION};
use paperlink_ingestion::IngestionProcessor;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ingestion", version, about = "Build section trees and chunks from parsed documents")]
struct Cli {
    /// Parsed-document JSON file, or a directory of them
    input: PathBuf,

    /// Directory receiving one folder per document
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file used instead of the layered config/ directory
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(&path.to_string_lossy()),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config.observability);
    info!("Starting PaperLink Ingestion v{}", VERSION);
    metrics::register_metrics();

    if let Some(output) = cli.output {
        config.storage.output_dir = output.display().to_string();
    }
    let processor = IngestionProcessor::new(config);

    if cli.input.is_dir() {
        let report = processor.process_directory(&cli.input).await?;
        for (path, message) in &report.failed {
            error!(path = %path.display(), error = %message, "Skipped document");
        }
        if !report.failed.is_empty() {
            anyhow::bail!(
                "{} of {} document(s) failed",
                report.failed.len(),
                report.failed.len() + report.succeeded.len()
            );
        }
    } else {
        let summary = processor
            .process_file(&cli.input)
            .await
            .with_context(|| format!("Failed to ingest {}", cli.input.display()))?;
        info!(
            doc_id = %summary.doc_id,
            sections = summary.sections,
            chunks = summary.chunks,
            images = summary.images,
            anomalies = summary.anomalies,
            graph = %summary.graph_path.display(),
            "Ingestion complete"
        );
    }

    Ok(())
}
