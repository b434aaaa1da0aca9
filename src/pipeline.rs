//! Batched, deduplicating ingestion into an [`IndexStore`].
//!
//! # Per-batch steps
//!
//! ```text
//! entries ─► load ─► fingerprints ─► dedup ─► enrich ─► insert ─► persist
//!                    (fresh read)             (bounded            (only if the
//!                                             concurrency)        batch had new items)
//! ```
//!
//! Batches run strictly in order: batch *n* is inserted and persisted
//! before batch *n + 1* reads the store's fingerprints, so an item repeated
//! across batches is committed once. Within a batch the first occurrence of
//! a fingerprint wins.
//!
//! Failures:
//! - a source that cannot be loaded, an item the enricher rejects, or an
//!   item the embedder rejects is dropped and counted in the batch's
//!   `failed`. If embedding the batch as a whole fails, its records are
//!   retried one at a time so a single bad item cannot block the rest;
//! - a persist error aborts the run as [`IngestError::Persist`].
//!
//! The enricher never sees the store; only the pipeline writes to it.

use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tracing::Instrument;

use vector_ingest_core::batch::{BatchOptions, BatchPlan, BatchReport, FailureStage, RunReport};
use vector_ingest_core::dedup::{partition, Partition};
use vector_ingest_core::enrich::{enrich_item, Enricher};
use vector_ingest_core::models::{IndexRecord, Item};
use vector_ingest_core::store::IndexStore;

use crate::errors::IngestError;
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::sources::SourceLoader;

const DEFAULT_CONCURRENCY: usize = 4;

pub struct BatchIngestionPipeline {
    enricher: Arc<dyn Enricher>,
    concurrency: usize,
    progress: Box<dyn ProgressReporter>,
}

impl BatchIngestionPipeline {
    pub fn new(enricher: Arc<dyn Enricher>) -> Self {
        Self {
            enricher,
            concurrency: DEFAULT_CONCURRENCY,
            progress: Box::new(NoProgress),
        }
    }

    /// Maximum enrich (and load) calls in flight within one batch.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Ingest already-built items.
    pub async fn run(
        &self,
        store: &mut dyn IndexStore,
        items: Vec<Item>,
        options: BatchOptions,
    ) -> Result<RunReport> {
        let plan = BatchPlan::new(items.len(), options);
        let mut run = RunReport::new(&plan);
        log_plan("items", &plan);

        let mut remaining = items.into_iter();
        for (n, range) in plan.ranges().enumerate() {
            let candidates: Vec<Item> = remaining.by_ref().take(range.len()).collect();
            let mut report = BatchReport::new(n + 1);
            report.seen = candidates.len();

            let report = self
                .process_batch(store, report, candidates)
                .instrument(tracing::info_span!("batch", phase = "items", batch = n + 1))
                .await?;
            self.finish_batch("items", &plan, report, &mut run);
        }

        log_totals("items", &run);
        Ok(run)
    }

    /// Load each batch's entries with `loader`, then ingest them as in
    /// [`run`](Self::run). `phase` labels logs and progress.
    pub async fn run_sources(
        &self,
        store: &mut dyn IndexStore,
        entries: &[String],
        loader: &dyn SourceLoader,
        options: BatchOptions,
        phase: &str,
    ) -> Result<RunReport> {
        let plan = BatchPlan::new(entries.len(), options);
        let mut run = RunReport::new(&plan);
        log_plan(phase, &plan);

        for (n, range) in plan.ranges().enumerate() {
            let span = tracing::info_span!("batch", phase, batch = n + 1);
            self.progress.report(ProgressEvent::Loading {
                phase: phase.to_string(),
                batch: n + 1,
                total: plan.total,
            });

            let batch = &entries[range];
            let mut report = BatchReport::new(n + 1);
            report.seen = batch.len();

            let loaded: Vec<(&String, Result<Item>)> = stream::iter(
                batch
                    .iter()
                    .map(move |entry| async move { (entry, loader.load(entry).await) }),
            )
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .instrument(span.clone())
            .await;

            let mut candidates = Vec::with_capacity(loaded.len());
            for (entry, result) in loaded {
                match result {
                    Ok(item) => candidates.push(item),
                    Err(e) => {
                        let reason = format!("{:#}", e);
                        span.in_scope(|| {
                            tracing::warn!(source = %entry, error = %reason, "load failed, entry dropped")
                        });
                        report.record_failure(entry, FailureStage::Load, reason);
                    }
                }
            }

            let report = self
                .process_batch(store, report, candidates)
                .instrument(span)
                .await?;
            self.finish_batch(phase, &plan, report, &mut run);
        }

        log_totals(phase, &run);
        Ok(run)
    }

    async fn process_batch(
        &self,
        store: &mut dyn IndexStore,
        mut report: BatchReport,
        candidates: Vec<Item>,
    ) -> Result<BatchReport> {
        let batch = report.batch;
        let existing = store.existing_fingerprints();
        let Partition { new, duplicates } = partition(candidates, &existing);
        report.duplicates = duplicates.len();
        for dup in &duplicates {
            tracing::debug!(source = %dup.item.source, fingerprint = %dup.fingerprint, "duplicate skipped");
        }

        if new.is_empty() {
            tracing::info!(seen = report.seen, duplicates = report.duplicates, "no new items");
            return Ok(report);
        }

        let enricher: &dyn Enricher = self.enricher.as_ref();
        let enriched: Vec<_> = stream::iter(new.into_iter().map(move |entry| async move {
            let source = entry.item.source.clone();
            let result = enrich_item(enricher, entry.item).await;
            (entry.fingerprint, source, result)
        }))
        .buffered(self.concurrency)
        .collect::<Vec<_>>()
        .await;

        let mut records = Vec::with_capacity(enriched.len());
        for (fingerprint, source, result) in enriched {
            match result {
                Ok(item) => {
                    report.enriched += 1;
                    records.push(IndexRecord::from_item(item, fingerprint));
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    tracing::warn!(
                        source = %source,
                        enricher = enricher.name(),
                        error = %reason,
                        "enrichment failed, item dropped"
                    );
                    report.record_failure(&source, FailureStage::Enrich, reason);
                }
            }
        }

        if records.is_empty() {
            tracing::info!(failed = report.failed, "every new item failed enrichment");
            return Ok(report);
        }

        report.committed = insert_records(store, &mut report, records).await;
        if report.committed == 0 {
            tracing::info!(failed = report.failed, "every new item failed embedding");
            return Ok(report);
        }

        store.persist().await.map_err(|e| IngestError::Persist {
            batch,
            reason: format!("{:#}", e),
        })?;
        report.persisted = true;

        tracing::info!(
            seen = report.seen,
            duplicates = report.duplicates,
            committed = report.committed,
            failed = report.failed,
            store_len = store.len(),
            "batch committed"
        );
        Ok(report)
    }

    fn finish_batch(&self, phase: &str, plan: &BatchPlan, report: BatchReport, run: &mut RunReport) {
        self.progress.report(ProgressEvent::BatchDone {
            phase: phase.to_string(),
            total: plan.total,
            report: report.clone(),
        });
        run.batches.push(report);
    }
}

/// Insert `records` in one call, falling back to one call per record when
/// the batch call fails. Records that still fail are recorded against
/// `report`. Returns how many were appended.
async fn insert_records(
    store: &mut dyn IndexStore,
    report: &mut BatchReport,
    records: Vec<IndexRecord>,
) -> usize {
    let err = match store.insert(records.clone()).await {
        Ok(appended) => return appended,
        Err(e) => e,
    };
    let reason = format!("{:#}", err);
    tracing::warn!(
        records = records.len(),
        error = %reason,
        "batch embedding failed, retrying records one at a time"
    );

    let mut appended = 0;
    for record in records {
        let source = record.metadata.source.clone();
        match store.insert(vec![record]).await {
            Ok(n) => appended += n,
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::warn!(source = %source, error = %reason, "embedding failed, item dropped");
                report.record_failure(&source, FailureStage::Embed, reason);
            }
        }
    }
    appended
}

fn log_plan(phase: &str, plan: &BatchPlan) {
    if plan.total < plan.available {
        tracing::info!(
            phase,
            entries = plan.len,
            batch_size = plan.batch_size,
            batches = plan.total,
            available = plan.available,
            skipped_entries = plan.len - plan.covered(),
            "batch limit applied"
        );
    } else {
        tracing::info!(
            phase,
            entries = plan.len,
            batch_size = plan.batch_size,
            batches = plan.total,
            "starting ingest"
        );
    }
}

fn log_totals(phase: &str, run: &RunReport) {
    let totals = run.totals();
    if run.has_failures() {
        tracing::warn!(
            phase,
            seen = totals.seen,
            duplicates = totals.duplicates,
            committed = totals.committed,
            failed = totals.failed,
            "ingest finished with dropped items"
        );
    } else {
        tracing::info!(
            phase,
            seen = totals.seen,
            duplicates = totals.duplicates,
            committed = totals.committed,
            "ingest finished"
        );
    }
}
