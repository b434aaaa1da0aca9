//! # Vector Ingest
//!
//! Deduplicating, batched, crash-consistent ingestion of documents and
//! captioned images into a persistent vector index.
//!
//! Every item gets a content fingerprint; only items whose fingerprint the
//! index has not seen are enriched, embedded, and committed. Batches run in
//! order and each batch that adds records is persisted before the next one
//! starts, so an interrupted run loses at most the batch in flight and a
//! rerun over the same source list commits nothing new.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌────────────────────────────┐   ┌──────────────┐
//! │ Source list │──▶│ Pipeline                    │──▶│ Index dir    │
//! │ URLs/files  │   │ dedup ▸ enrich ▸ embed      │   │ CURRENT      │
//! │ image dir   │   │ insert ▸ persist per batch  │   │ gen-N/       │
//! └─────────────┘   └────────────────────────────┘   └──────┬───────┘
//!                                                          │
//!                                                   ┌──────▼──────┐
//!                                                   │ search/stats│
//!                                                   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vingest init                      # create (or verify) the index
//! vingest ingest                    # ingest the configured source list
//! vingest ingest --batch-limit 2    # only the first two batches
//! vingest search "transformers"     # cosine top-k over committed records
//! vingest stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`errors`] | Fatal error classes |
//! | [`logging`] | Run-scoped `tracing` subscriber |
//! | [`sources`] | Source list reading, URL normalization, loading |
//! | [`connector_images`] | Image directory scanning |
//! | [`embedding`] | Embedding providers |
//! | [`enrichment`] | Summary and caption providers |
//! | [`file_store`] | File-backed index store |
//! | [`pipeline`] | Batched deduplicating ingestion |
//! | [`progress`] | Per-batch progress on stderr |
//! | [`ingest`] | `init` / `ingest` commands |
//! | [`search`] | `search` command |
//! | [`stats`] | `stats` command |
//!
//! The I/O-free core (models, identity, dedup, batch planning, store
//! trait) lives in the `vector-ingest-core` crate and is re-exported as
//! [`core`].

pub use vector_ingest_core as core;

pub mod config;
pub mod connector_images;
pub mod embedding;
pub mod enrichment;
pub mod errors;
pub mod file_store;
mod http;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod search;
pub mod sources;
pub mod stats;
