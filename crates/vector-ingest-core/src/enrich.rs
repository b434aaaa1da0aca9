//! Enrichment collaborator boundary.
//!
//! An [`Enricher`] produces the derived fields an item needs before it can
//! be committed: a summary for documents and a caption for images.
//! [`enrich_item`] applies it to one item. Calls are fallible and may be
//! slow; the pipeline treats an error as an item-local failure.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{Item, ItemKind, DERIVED_SUMMARY};

#[async_trait]
pub trait Enricher: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn summarize(&self, text: &str) -> Result<String>;

    async fn caption(&self, image: &[u8]) -> Result<String>;
}

/// Populate an item's derived fields, consuming and returning it.
///
/// Documents get `derived["summary"]`. Images without a caption are
/// captioned from their decoded payload; images that already carry one are
/// passed through untouched.
pub async fn enrich_item(enricher: &dyn Enricher, mut item: Item) -> Result<Item> {
    match item.kind {
        ItemKind::Document => {
            let summary = enricher.summarize(&item.content).await?;
            item.derived.insert(DERIVED_SUMMARY.to_string(), summary);
        }
        ItemKind::Image => {
            if item.content.trim().is_empty() {
                let bytes = item.payload_bytes()?;
                let caption = enricher.caption(&bytes).await?;
                if caption.trim().is_empty() {
                    bail!("enricher {} returned an empty caption", enricher.name());
                }
                item.content = caption;
            }
        }
    }
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        captions: AtomicUsize,
    }

    #[async_trait]
    impl Enricher for Counting {
        fn name(&self) -> &str {
            "counting"
        }
        async fn summarize(&self, text: &str) -> Result<String> {
            Ok(format!("summary: {}", text.len()))
        }
        async fn caption(&self, image: &[u8]) -> Result<String> {
            self.captions.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{} bytes", image.len()))
        }
    }

    #[tokio::test]
    async fn documents_get_a_summary() {
        let e = Counting::default();
        let item = enrich_item(&e, Item::document("s", "t", "hello")).await.unwrap();
        assert_eq!(item.derived.get(DERIVED_SUMMARY).unwrap(), "summary: 5");
    }

    #[tokio::test]
    async fn images_are_captioned_once() {
        let e = Counting::default();
        let item = enrich_item(&e, Item::image("a.png", &[1, 2, 3], ""))
            .await
            .unwrap();
        assert_eq!(item.content, "3 bytes");

        let item = enrich_item(&e, Item::image("b.png", &[1], "existing caption"))
            .await
            .unwrap();
        assert_eq!(item.content, "existing caption");
        assert_eq!(e.captions.load(Ordering::SeqCst), 1);
    }
}
