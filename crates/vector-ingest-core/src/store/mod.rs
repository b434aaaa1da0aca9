//! Index store abstraction.
//!
//! The [`IndexStore`] trait is the capability the pipeline needs from a
//! persistent vector index: read the fingerprints already held, append
//! records, and persist. Opening a store (load an existing index or
//! bootstrap an empty one) is a constructor on each implementation rather
//! than a trait method.
//!
//! [`IndexState`] is the in-memory structure both implementations share:
//! records in insertion order, one vector per record, and the fingerprint
//! set. Records and vectors always change together.
//!
//! Mutating methods take `&mut self`: the pipeline is the only writer.

pub mod memory;

use std::collections::HashSet;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::{Fingerprint, IndexRecord, ItemKind};

/// A record scored against a query vector.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub score: f32,
    pub record: IndexRecord,
}

/// Summary of what a store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub records: usize,
    pub documents: usize,
    pub images: usize,
    pub dims: usize,
}

/// Abstract persistent index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`existing_fingerprints`](IndexStore::existing_fingerprints) | Identities currently held |
/// | [`insert`](IndexStore::insert) | Embed and append records in memory |
/// | [`persist`](IndexStore::persist) | Write the full state as one unit |
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Fingerprints of every record held, including records inserted
    /// earlier in this run.
    fn existing_fingerprints(&self) -> HashSet<Fingerprint>;

    /// Embed and append records to the live structure. Returns how many
    /// were appended; records whose fingerprint is already held are
    /// skipped. An empty input is a no-op. On error nothing is appended.
    async fn insert(&mut self, records: Vec<IndexRecord>) -> Result<usize>;

    /// Write the current state to durable storage. Calling it again with
    /// no intervening insert changes nothing.
    async fn persist(&mut self) -> Result<()>;

    fn state(&self) -> &IndexState;

    fn len(&self) -> usize {
        self.state().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Top `limit` records by cosine similarity to `query`.
    fn search(&self, query: &[f32], limit: usize) -> Vec<SearchHit> {
        self.state().search(query, limit)
    }
}

/// Records, vectors, and fingerprints of an index.
#[derive(Debug, Clone, Default)]
pub struct IndexState {
    dims: usize,
    model: String,
    records: Vec<IndexRecord>,
    vectors: Vec<Vec<f32>>,
    fingerprints: HashSet<Fingerprint>,
}

impl IndexState {
    pub fn new(dims: usize, model: impl Into<String>) -> Self {
        Self {
            dims,
            model: model.into(),
            ..Default::default()
        }
    }

    /// Rebuild state from persisted parts, checking they agree.
    pub fn from_parts(
        dims: usize,
        model: impl Into<String>,
        records: Vec<IndexRecord>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if records.len() != vectors.len() {
            bail!(
                "index holds {} vectors but {} records",
                vectors.len(),
                records.len()
            );
        }
        if let Some(bad) = vectors.iter().position(|v| v.len() != dims) {
            bail!("vector {} has length {}, expected {}", bad, vectors[bad].len(), dims);
        }
        let mut fingerprints = HashSet::with_capacity(records.len());
        for r in &records {
            if !fingerprints.insert(r.fingerprint) {
                bail!("fingerprint {} appears more than once", r.fingerprint);
            }
        }
        Ok(Self {
            dims,
            model: model.into(),
            records,
            vectors,
            fingerprints,
        })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn fingerprints(&self) -> &HashSet<Fingerprint> {
        &self.fingerprints
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Embed the content of every record not already held and append it.
    ///
    /// Nothing is appended unless the embedder succeeds for the whole
    /// input and every vector has the index's dimensionality.
    pub async fn embed_and_append(
        &mut self,
        embedder: &dyn Embedder,
        records: Vec<IndexRecord>,
    ) -> Result<usize> {
        let mut seen = HashSet::new();
        let fresh: Vec<IndexRecord> = records
            .into_iter()
            .filter(|r| !self.fingerprints.contains(&r.fingerprint) && seen.insert(r.fingerprint))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = fresh.iter().map(|r| r.content.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != fresh.len() {
            bail!(
                "embedder {} returned {} vectors for {} texts",
                embedder.model_name(),
                vectors.len(),
                fresh.len()
            );
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != self.dims) {
            bail!(
                "embedder {} returned a {}-dim vector for a {}-dim index",
                embedder.model_name(),
                v.len(),
                self.dims
            );
        }

        let appended = fresh.len();
        for (record, vector) in fresh.into_iter().zip(vectors) {
            self.fingerprints.insert(record.fingerprint);
            self.records.push(record);
            self.vectors.push(vector);
        }
        Ok(appended)
    }

    pub fn search(&self, query: &[f32], limit: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (cosine_similarity(query, v), i))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
            .into_iter()
            .map(|(score, i)| SearchHit {
                score,
                record: self.records[i].clone(),
            })
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        let images = self
            .records
            .iter()
            .filter(|r| r.metadata.kind == ItemKind::Image)
            .count();
        StoreStats {
            records: self.records.len(),
            documents: self.records.len() - images,
            images,
            dims: self.dims,
        }
    }
}
