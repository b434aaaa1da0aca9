//! Batch deduplication.
//!
//! [`partition`] splits a batch of candidates into new items and duplicates.
//! A candidate is a duplicate if its fingerprint is already in the store or
//! belongs to an earlier candidate of the same batch; the first occurrence
//! wins. The existing set is only read.

use std::collections::HashSet;

use crate::identity::item_fingerprint;
use crate::models::{Fingerprint, Item};

/// A candidate paired with the fingerprint computed for it.
#[derive(Debug, Clone)]
pub struct Fingerprinted {
    pub fingerprint: Fingerprint,
    pub item: Item,
}

/// Result of [`partition`], both sides in input order.
#[derive(Debug, Default)]
pub struct Partition {
    pub new: Vec<Fingerprinted>,
    pub duplicates: Vec<Fingerprinted>,
}

pub fn partition(candidates: Vec<Item>, existing: &HashSet<Fingerprint>) -> Partition {
    let mut accepted: HashSet<Fingerprint> = HashSet::with_capacity(candidates.len());
    let mut out = Partition::default();

    for item in candidates {
        let fingerprint = item_fingerprint(&item);
        let entry = Fingerprinted { fingerprint, item };
        if existing.contains(&fingerprint) || !accepted.insert(fingerprint) {
            out.duplicates.push(entry);
        } else {
            out.new.push(entry);
        }
    }

    out
}
