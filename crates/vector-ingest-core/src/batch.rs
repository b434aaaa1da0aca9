//! Batch planning and run accounting.
//!
//! [`BatchPlan`] decides how a source list is sliced: `ceil(len / size)`
//! batches, optionally capped by a batch limit. The cap only drops trailing
//! batches; it never changes which entries belong to a batch.
//!
//! [`BatchReport`] and [`RunReport`] carry the per-batch and total counts
//! surfaced to the caller.

use std::num::NonZeroUsize;
use std::ops::Range;

use serde::Serialize;

/// Validated batching options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub batch_size: NonZeroUsize,
    pub batch_limit: Option<NonZeroUsize>,
}

impl BatchOptions {
    pub const DEFAULT_BATCH_SIZE: usize = 50;

    pub fn new(batch_size: usize, batch_limit: Option<usize>) -> anyhow::Result<Self> {
        let batch_size = NonZeroUsize::new(batch_size)
            .ok_or_else(|| anyhow::anyhow!("batch_size must be > 0"))?;
        let batch_limit = match batch_limit {
            Some(limit) => Some(
                NonZeroUsize::new(limit)
                    .ok_or_else(|| anyhow::anyhow!("batch_limit must be > 0 when set"))?,
            ),
            None => None,
        };
        Ok(Self {
            batch_size,
            batch_limit,
        })
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: NonZeroUsize::new(Self::DEFAULT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN),
            batch_limit: None,
        }
    }
}

/// How a list of `len` entries is split into batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub len: usize,
    pub batch_size: usize,
    /// Batches the full list would need.
    pub available: usize,
    /// Batches that will actually run after the limit.
    pub total: usize,
}

impl BatchPlan {
    pub fn new(len: usize, options: BatchOptions) -> Self {
        let batch_size = options.batch_size.get();
        let available = len.div_ceil(batch_size);
        let total = match options.batch_limit {
            Some(limit) => available.min(limit.get()),
            None => available,
        };
        Self {
            len,
            batch_size,
            available,
            total,
        }
    }

    /// Index range of batch `n` (0-based). Panics if `n >= available`.
    pub fn range(&self, n: usize) -> Range<usize> {
        assert!(n < self.available, "batch {} out of range", n);
        let start = n * self.batch_size;
        start..(start + self.batch_size).min(self.len)
    }

    /// Ranges of every batch that will run.
    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.total).map(|n| self.range(n))
    }

    /// Number of entries covered by the batches that will run.
    pub fn covered(&self) -> usize {
        (self.total * self.batch_size).min(self.len)
    }
}

/// Why a single item was dropped from its batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub source: String,
    pub stage: FailureStage,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Load,
    Enrich,
    /// The embedder rejected the item even when embedded on its own.
    Embed,
}

/// Counts for one processed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// 1-based batch number.
    pub batch: usize,
    pub seen: usize,
    pub duplicates: usize,
    pub enriched: usize,
    pub committed: usize,
    pub failed: usize,
    pub persisted: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn new(batch: usize) -> Self {
        Self {
            batch,
            ..Default::default()
        }
    }

    pub fn record_failure(&mut self, source: &str, stage: FailureStage, reason: String) {
        self.failed += 1;
        self.failures.push(ItemFailure {
            source: source.to_string(),
            stage,
            reason,
        });
    }
}

/// Totals over all processed batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub seen: usize,
    pub duplicates: usize,
    pub enriched: usize,
    pub committed: usize,
    pub failed: usize,
}

/// Result of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Batches the input would need without a limit.
    pub available_batches: usize,
    pub batches: Vec<BatchReport>,
}

impl RunReport {
    pub fn new(plan: &BatchPlan) -> Self {
        Self {
            available_batches: plan.available,
            batches: Vec::with_capacity(plan.total),
        }
    }

    pub fn totals(&self) -> RunTotals {
        self.batches
            .iter()
            .fold(RunTotals::default(), |mut acc, b| {
                acc.seen += b.seen;
                acc.duplicates += b.duplicates;
                acc.enriched += b.enriched;
                acc.committed += b.committed;
                acc.failed += b.failed;
                acc
            })
    }

    /// True if any item was dropped. A warning, not a run failure.
    pub fn has_failures(&self) -> bool {
        self.batches.iter().any(|b| b.failed > 0)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "available_batches": self.available_batches,
            "processed_batches": self.batches.len(),
            "totals": self.totals(),
            "batches": self.batches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(size: usize, limit: Option<usize>) -> BatchOptions {
        BatchOptions::new(size, limit).unwrap()
    }

    #[test]
    fn total_is_ceiling_division() {
        assert_eq!(BatchPlan::new(0, opts(50, None)).total, 0);
        assert_eq!(BatchPlan::new(1, opts(50, None)).total, 1);
        assert_eq!(BatchPlan::new(50, opts(50, None)).total, 1);
        assert_eq!(BatchPlan::new(51, opts(50, None)).total, 2);
        assert_eq!(BatchPlan::new(3, opts(2, None)).total, 2);
    }

    #[test]
    fn limit_caps_batches_without_moving_boundaries() {
        let plan = BatchPlan::new(10, opts(3, Some(2)));
        assert_eq!(plan.available, 4);
        assert_eq!(plan.total, 2);
        let ranges: Vec<_> = plan.ranges().collect();
        assert_eq!(ranges, vec![0..3, 3..6]);
        assert_eq!(plan.covered(), 6);
    }

    #[test]
    fn limit_larger_than_available() {
        let plan = BatchPlan::new(5, opts(3, Some(10)));
        assert_eq!(plan.total, 2);
        assert_eq!(plan.covered(), 5);
        assert_eq!(plan.range(1), 3..5);
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(BatchOptions::new(0, None).is_err());
        assert!(BatchOptions::new(5, Some(0)).is_err());
        assert_eq!(BatchOptions::default().batch_size.get(), 50);
    }

    #[test]
    fn totals_sum_batches() {
        let mut report = RunReport::default();
        let mut b1 = BatchReport::new(1);
        b1.seen = 2;
        b1.duplicates = 1;
        b1.enriched = 1;
        b1.committed = 1;
        let mut b2 = BatchReport::new(2);
        b2.seen = 3;
        b2.enriched = 2;
        b2.committed = 2;
        b2.record_failure("https://a/3", FailureStage::Enrich, "timeout".into());
        report.batches = vec![b1, b2];

        let totals = report.totals();
        assert_eq!(totals.seen, 5);
        assert_eq!(totals.duplicates, 1);
        assert_eq!(totals.committed, 3);
        assert_eq!(totals.failed, 1);
        assert!(report.has_failures());
    }
}
