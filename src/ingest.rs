//! `vingest init` and `vingest ingest`.
//!
//! Wires config into the pipeline: source list → (optional) image
//! directory → embedder → store → enricher → batches. Everything that can
//! fail before the first batch (source list, image scan, index load or
//! bootstrap, provider setup) does so before any item is touched.

use std::time::Instant;

use anyhow::Result;

use vector_ingest_core::batch::RunReport;
use vector_ingest_core::store::IndexStore;

use crate::config::Config;
use crate::connector_images;
use crate::embedding::create_embedder;
use crate::enrichment::create_enricher;
use crate::file_store::FileIndexStore;
use crate::pipeline::BatchIngestionPipeline;
use crate::progress::{format_number, ProgressMode};
use crate::sources::{read_source_list, DefaultLoader};

/// Load or bootstrap the index and print where it lives.
pub async fn run_init(config: &Config) -> Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let store = FileIndexStore::load_or_bootstrap(&config.index.path, embedder).await?;
    println!(
        "Index ready at {} ({} records, {} dims, generation {}).",
        store.path().display(),
        store.len(),
        store.state().dims(),
        store.generation()
    );
    Ok(())
}

pub async fn run_ingest(config: &Config, json: bool, progress: ProgressMode) -> Result<()> {
    let started = Instant::now();

    let sources = read_source_list(&config.ingest.sources_file, config.ingest.source_limit)?;
    let images = match config.ingest.images_dir {
        Some(ref dir) => connector_images::scan_images(dir)?
            .into_iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect(),
        None => Vec::new(),
    };

    let embedder = create_embedder(&config.embedding)?;
    let mut store = FileIndexStore::load_or_bootstrap(&config.index.path, embedder).await?;
    let enricher = create_enricher(&config.enrichment)?;
    let loader = DefaultLoader::new(
        config.ingest.base_url.clone(),
        config.ingest.fetch_timeout_secs,
    )?;
    let options = config.batch_options()?;

    let pipeline = BatchIngestionPipeline::new(enricher)
        .with_concurrency(config.ingest.enrich_concurrency)
        .with_progress(progress.reporter());

    let documents = pipeline
        .run_sources(&mut store, &sources, &loader, options, "documents")
        .await?;
    let images = if images.is_empty() {
        None
    } else {
        Some(
            pipeline
                .run_sources(&mut store, &images, &loader, options, "images")
                .await?,
        )
    };

    let elapsed = started.elapsed();
    if json {
        let out = serde_json::json!({
            "documents": documents.to_json(),
            "images": images.as_ref().map(RunReport::to_json),
            "index": {
                "path": store.path(),
                "generation": store.generation(),
                "records": store.len(),
            },
            "elapsed_secs": elapsed.as_secs_f64(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_report("documents", &documents);
        if let Some(ref images) = images {
            print_report("images", images);
        }
        println!(
            "index {}  {} records  generation {}  ({:.1}s)",
            store.path().display(),
            format_number(store.len() as u64),
            store.generation(),
            elapsed.as_secs_f64()
        );
    }

    let failed = documents.totals().failed + images.as_ref().map_or(0, |r| r.totals().failed);
    if failed > 0 {
        tracing::warn!(failed, "some items were dropped; see the log for reasons");
    }
    Ok(())
}

fn print_report(phase: &str, report: &RunReport) {
    let totals = report.totals();
    println!("ingest {}", phase);
    println!(
        "  batches:     {} / {}",
        report.batches.len(),
        report.available_batches
    );
    println!("  seen:        {}", format_number(totals.seen as u64));
    println!("  duplicates:  {}", format_number(totals.duplicates as u64));
    println!("  committed:   {}", format_number(totals.committed as u64));
    println!("  failed:      {}", format_number(totals.failed as u64));
    for batch in report.batches.iter().filter(|b| b.failed > 0) {
        for failure in &batch.failures {
            println!(
                "    batch {}  {:?}  {}  {}",
                batch.batch, failure.stage, failure.source, failure.reason
            );
        }
    }
    println!();
}
