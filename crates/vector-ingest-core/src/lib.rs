//! # vector-ingest core
//!
//! Shared, I/O-free logic for vector-ingest: item and record models,
//! content identity, batch dedup, batch planning and reporting, and the
//! traits at the collaborator seams (embedding, enrichment, index store).
//!
//! This crate contains no tokio, reqwest, or filesystem I/O. The
//! file-backed store, providers, and the pipeline driver live in the
//! `vector-ingest` app crate.

pub mod batch;
pub mod dedup;
pub mod embedding;
pub mod enrich;
pub mod identity;
pub mod models;
pub mod store;
