//! In-memory [`IndexStore`] for tests.
//!
//! Holds an [`IndexState`] and "persists" by snapshotting it. Counts every
//! persist call that wrote something so tests can assert when the pipeline
//! touched durable state.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::{probe_dims, Embedder};
use crate::models::{Fingerprint, IndexRecord};

use super::{IndexState, IndexStore};

pub struct InMemoryStore {
    embedder: Arc<dyn Embedder>,
    state: IndexState,
    snapshot: Option<IndexState>,
    dirty: bool,
    writes: usize,
    fail_persist: bool,
}

impl InMemoryStore {
    /// Bootstrap an empty store sized by a probe embedding, and take the
    /// initial snapshot.
    pub async fn bootstrap(embedder: Arc<dyn Embedder>) -> Result<Self> {
        let dims = probe_dims(embedder.as_ref()).await?;
        let state = IndexState::new(dims, embedder.model_name());
        Ok(Self {
            embedder,
            snapshot: Some(state.clone()),
            state,
            dirty: false,
            writes: 1,
            fail_persist: false,
        })
    }

    /// Make every subsequent persist fail.
    pub fn fail_persist(&mut self, fail: bool) {
        self.fail_persist = fail;
    }

    /// Number of persists that wrote a snapshot, including the bootstrap.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Records held by the last snapshot.
    pub fn persisted_len(&self) -> usize {
        self.snapshot.as_ref().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl IndexStore for InMemoryStore {
    fn existing_fingerprints(&self) -> HashSet<Fingerprint> {
        self.state.fingerprints().clone()
    }

    async fn insert(&mut self, records: Vec<IndexRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let appended = self
            .state
            .embed_and_append(self.embedder.as_ref(), records)
            .await?;
        if appended > 0 {
            self.dirty = true;
        }
        Ok(appended)
    }

    async fn persist(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if self.fail_persist {
            bail!("persist failed (injected)");
        }
        self.snapshot = Some(self.state.clone());
        self.dirty = false;
        self.writes += 1;
        Ok(())
    }

    fn state(&self) -> &IndexState {
        &self.state
    }
}
