//! Fatal error classes.
//!
//! Everything else travels as plain `anyhow::Error`. These variants mark
//! the failures that abort a run so callers (and tests) can tell them apart
//! with `err.downcast_ref::<IngestError>()`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The source list is missing or unreadable. No batch has run.
    #[error("cannot read source list {path}: {reason}")]
    SourceRead { path: PathBuf, reason: String },

    /// A persisted index exists but cannot be loaded safely.
    #[error("persisted index at {path} is unreadable or inconsistent: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    /// Creating a fresh index failed (probe embedding or first write).
    #[error("bootstrapping index at {path} failed: {reason}")]
    Bootstrap { path: PathBuf, reason: String },

    /// Persisting a batch failed after its insert. The in-memory store
    /// may hold records that never reached disk.
    #[error("persisting batch {batch} failed: {reason}")]
    Persist { batch: usize, reason: String },
}
