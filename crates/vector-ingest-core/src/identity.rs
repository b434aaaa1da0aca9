//! Content identity.
//!
//! An item's [`Fingerprint`] is the first 128 bits of a SHA-256 digest over
//! its identity fields. Each field is written as a little-endian `u64`
//! byte length followed by its UTF-8 bytes, so `("ab", "c")` and
//! `("a", "bc")` never hash alike and no separator character is reserved.
//!
//! Two distinct items whose fingerprints collide are treated as the same
//! item. At 128 bits this false-duplicate risk is accepted.
//!
//! # Example
//!
//! ```rust
//! use vector_ingest_core::identity::fingerprint;
//!
//! let a = fingerprint(&["https://example.com/a", "Title"]);
//! let b = fingerprint(&["https://example.com/a", "Title"]);
//! assert_eq!(a, b);
//! ```

use sha2::{Digest, Sha256};

use crate::models::{Fingerprint, Item};

/// Fingerprint an ordered list of identity fields.
pub fn fingerprint(fields: &[&str]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update((fields.len() as u64).to_le_bytes());
    for field in fields {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    let digest = hasher.finalize();

    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    Fingerprint(out)
}

/// Fingerprint an item from its canonical identity fields.
pub fn item_fingerprint(item: &Item) -> Fingerprint {
    fingerprint(&item.identity_fields())
}
