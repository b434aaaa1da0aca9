//! Index statistics.
//!
//! A quick summary of what the index holds: record counts per kind,
//! dimensionality, model, generation, and on-disk size. Used by
//! `vingest stats` to confirm ingests are landing.

use std::sync::Arc;

use anyhow::Result;

use vector_ingest_core::store::IndexStore;

use crate::config::Config;
use crate::embedding::DisabledEmbedder;
use crate::file_store::FileIndexStore;
use crate::progress::format_number;

pub fn run_stats(config: &Config, json: bool) -> Result<()> {
    let Some(store) = FileIndexStore::load(&config.index.path, Arc::new(DisabledEmbedder))? else {
        println!(
            "No index at {}. Run `vingest init` to create one.",
            config.index.path.display()
        );
        return Ok(());
    };

    let stats = store.state().stats();
    let last_indexed = store
        .state()
        .records()
        .iter()
        .map(|r| r.indexed_at)
        .max();

    if json {
        let out = serde_json::json!({
            "path": store.path(),
            "generation": store.generation(),
            "model": store.state().model(),
            "size_bytes": store.disk_size(),
            "last_indexed": last_indexed,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Vector Ingest Index Stats");
    println!("=========================");
    println!();
    println!("  Index:       {}", store.path().display());
    println!("  Generation:  {}", store.generation());
    println!("  Size:        {}", format_bytes(store.disk_size()));
    println!("  Model:       {}", store.state().model());
    println!("  Dims:        {}", stats.dims);
    println!();
    println!("  Records:     {}", format_number(stats.records as u64));
    println!("    documents: {}", format_number(stats.documents as u64));
    println!("    images:    {}", format_number(stats.images as u64));
    if let Some(ts) = last_indexed {
        println!("  Last added:  {}", ts.format("%Y-%m-%d %H:%M"));
    }
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
