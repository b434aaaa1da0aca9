//! # Vector Ingest CLI (`vingest`)
//!
//! ## Usage
//!
//! ```bash
//! vingest --config ./config/ingest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vingest init` | Load the index, or bootstrap and persist an empty one |
//! | `vingest ingest` | Ingest the source list (and image directory) in batches |
//! | `vingest search "<query>"` | Cosine top-k over committed records |
//! | `vingest stats` | Record counts, dims, generation, size |
//!
//! ## Examples
//!
//! ```bash
//! # First two batches of 20, progress as JSON lines on stderr
//! vingest ingest --batch-size 20 --batch-limit 2 --progress json
//!
//! # Also ingest a directory of screenshots
//! vingest ingest --images ./data/images
//!
//! # Machine-readable run report
//! vingest ingest --json > report.json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vector_ingest::config::{self, Overrides};
use vector_ingest::progress::ProgressMode;
use vector_ingest::{ingest, logging, search, stats};

/// Vector Ingest: deduplicating, batched ingestion of documents and images
/// into a persistent vector index.
#[derive(Parser)]
#[command(
    name = "vingest",
    about = "Deduplicating, batched, crash-consistent ingestion into a persistent vector index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ingest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the index, or create and persist an empty one.
    ///
    /// Bootstrapping makes one probe embedding call to learn the vector
    /// dimensionality. Running it again on an existing index only
    /// verifies that it loads.
    Init,

    /// Ingest the configured source list.
    ///
    /// Entries are processed in batches. Each batch is deduplicated against
    /// the index, enriched, embedded, inserted, and persisted before the
    /// next batch starts. Items already in the index are skipped.
    Ingest {
        /// Entries per batch (overrides `ingest.batch_size`).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Process at most this many batches.
        #[arg(long)]
        batch_limit: Option<usize>,

        /// Read at most this many entries from the source list.
        #[arg(long)]
        source_limit: Option<usize>,

        /// Also ingest every image under this directory.
        #[arg(long)]
        images: Option<PathBuf>,

        /// Print the run report as JSON on stdout.
        #[arg(long)]
        json: bool,

        /// Progress on stderr: `human`, `json`, or `off`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Search committed records by embedding similarity.
    Search {
        /// The query text.
        query: String,

        /// Maximum number of results (defaults to `retrieval.top_k`).
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Show what the index holds.
    Stats {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let overrides = match &cli.command {
        Commands::Ingest {
            batch_size,
            batch_limit,
            source_limit,
            images,
            ..
        } => Overrides {
            batch_size: *batch_size,
            batch_limit: *batch_limit,
            source_limit: *source_limit,
            images_dir: images.clone(),
        },
        _ => Overrides::default(),
    };

    let cfg = config::load_config(&cli.config, overrides)?;
    let _log = logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Init => {
            ingest::run_init(&cfg).await?;
        }
        Commands::Ingest { json, progress, .. } => {
            let mode = match progress {
                Some(ref value) => ProgressMode::parse(value)?,
                None => ProgressMode::default_for_tty(),
            };
            ingest::run_ingest(&cfg, json, mode).await?;
        }
        Commands::Search { query, limit, json } => {
            search::run_search(&cfg, &query, limit, json).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json)?;
        }
    }

    Ok(())
}
