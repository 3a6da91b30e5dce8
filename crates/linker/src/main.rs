//! PaperLink Linker
//!
//! Links extracted images to the chunks that describe them:
//! 1. Loads a document graph written by the ingestion stage
//! 2. Resolves captions and acquires embeddings from the configured provider
//! 3. Confirms at most one chunk per image
//! 4. Writes the updated graph and `multimodal_summary.json`

use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use paperlink_common::config::{AppConfig, ObservabilityConfig};
use paperlink_common::embeddings::create_provider;
use paperlink_common::metrics::{self, EMBEDDING_BUCKETS, STAGE_BUCKETS};
use paperlink_common::{ArtifactStore, VERSION};
use paperlink_linker::MultimodalLinker;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "linker", version, about = "Link document images to their best-matching chunks")]
struct Cli {
    /// Configuration file used instead of the layered config/ directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Link the images of one document graph
    Link {
        /// graph.json produced by the ingestion stage
        graph: PathBuf,

        /// Base directory for image file paths
        #[arg(short, long)]
        images: Option<PathBuf>,

        /// Directory receiving the linked graph and summary
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Embed one string and print the vector's shape
    Probe { text: String },
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

fn install_exporter(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .set_buckets_for_metric(
            Matcher::Suffix("embedding_duration_seconds".to_string()),
            EMBEDDING_BUCKETS,
        )?
        .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), STAGE_BUCKETS)?
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!(port, "Prometheus exporter listening");
    Ok(())
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
    info!("Starting PaperLink Linker v{}", VERSION);

    if config.observability.metrics_port != 0 {
        install_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    match cli.command {
        Command::Link {
            graph,
            images,
            output,
        } => {
            if let Some(images) = images {
                config.storage.image_root = images.display().to_string();
            }
            if let Some(output) = output {
                config.storage.output_dir = output.display().to_string();
            }

            let linker = MultimodalLinker::from_config(&config)?;
            info!(model = %linker.model_name(), "Embedding provider initialized");
            let store = ArtifactStore::new(&config.storage.output_dir);

            let linked = linker
                .process_graph_file(&graph, &store)
                .await
                .with_context(|| format!("Failed to link {}", graph.display()))?;

            for failure in &linked.report.failures {
                warn!(error = %failure.as_error(), "Entity excluded from matching");
            }
            info!(
                doc_id = %linked.doc_id,
                confirmed = linked.report.outcome.confirmed.len(),
                rejected = linked.report.outcome.rejected.len(),
                graph = %linked.graph_path.display(),
                summary = %linked.summary_path.display(),
                "Linking complete"
            );
        }
        Command::Probe { text } => {
            let provider = create_provider(&config.embedding)?;
            let vector = provider
                .embed_text(&text)
                .await
                .context("Embedding request failed")?;
            let head: Vec<f32> = vector.iter().take(5).copied().collect();
            println!("model: {}", provider.model_name());
            println!("dimension: {}", vector.len());
            println!("first values: {:?}", head);
        }
    }

    Ok(())
}
