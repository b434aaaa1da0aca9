//! `vingest search`: cosine top-k over committed records.
//!
//! Hits are returned best-first until the configured context budget
//! (`retrieval.token_limit`) would be exceeded, so whatever consumes them
//! downstream never receives more context than it was promised.

use std::sync::Arc;

use anyhow::{bail, Result};

use vector_ingest_core::embedding::embed_one;
use vector_ingest_core::store::{IndexStore, SearchHit};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::file_store::FileIndexStore;

/// Rough token estimate: four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Text a hit contributes to a consumer's context: content plus summary.
fn hit_tokens(hit: &SearchHit) -> usize {
    estimate_tokens(&hit.record.content)
        + hit
            .record
            .metadata
            .summary
            .as_deref()
            .map_or(0, estimate_tokens)
}

/// Keep hits in order while their combined estimate fits in `token_limit`.
pub fn within_budget(hits: Vec<SearchHit>, token_limit: usize) -> Vec<SearchHit> {
    let mut used = 0usize;
    let mut kept = Vec::with_capacity(hits.len());
    for hit in hits {
        let cost = hit_tokens(&hit);
        if used + cost > token_limit {
            tracing::debug!(used, cost, token_limit, "context budget reached");
            break;
        }
        used += cost;
        kept.push(hit);
    }
    kept
}

pub async fn run_search(config: &Config, query: &str, limit: Option<usize>, json: bool) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let embedder = create_embedder(&config.embedding)?;
    let Some(store) = FileIndexStore::load(&config.index.path, Arc::clone(&embedder))? else {
        bail!(
            "No index at {}. Run `vingest init` or `vingest ingest` first.",
            config.index.path.display()
        );
    };

    let query_vec = embed_one(embedder.as_ref(), query).await?;
    let limit = limit.unwrap_or(config.retrieval.top_k);
    let hits = within_budget(store.search(&query_vec, limit), config.retrieval.token_limit);

    if json {
        let out: Vec<serde_json::Value> = hits
            .iter()
            .map(|h| {
                serde_json::json!({
                    "score": h.score,
                    "id": h.record.id,
                    "kind": h.record.metadata.kind,
                    "source": h.record.metadata.source,
                    "title": h.record.metadata.title,
                    "summary": h.record.metadata.summary,
                    "content": h.record.content,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let meta = &hit.record.metadata;
        let title = meta
            .title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or("(untitled)");
        println!("{}. [{:.3}] {} / {}", i + 1, hit.score, meta.kind, title);
        println!("    source: {}", meta.source);
        if let Some(ref summary) = meta.summary {
            println!("    summary: \"{}\"", excerpt(summary, 240));
        } else {
            println!("    excerpt: \"{}\"", excerpt(&hit.record.content, 240));
        }
        println!("    indexed: {}", hit.record.indexed_at.format("%Y-%m-%d %H:%M"));
        println!();
    }
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vector_ingest_core::identity::item_fingerprint;
    use vector_ingest_core::models::{IndexRecord, Item, DERIVED_SUMMARY};

    fn hit(content_len: usize, summary_len: Option<usize>) -> SearchHit {
        let mut item = Item::document("https://a/x", "x", "a".repeat(content_len));
        if let Some(n) = summary_len {
            item.derived.insert(DERIVED_SUMMARY.to_string(), "s".repeat(n));
        }
        let fp = item_fingerprint(&item);
        SearchHit {
            score: 1.0,
            record: IndexRecord::from_item(item, fp),
        }
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens("abcdefghi"), 3);
    }

    #[test]
    fn budget_stops_before_overflow() {
        // 10 + 10 + 10 tokens against a budget of 25.
        let hits = vec![hit(40, None), hit(20, Some(20)), hit(40, None)];
        let kept = within_budget(hits, 25);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn budget_can_exclude_everything() {
        assert!(within_budget(vec![hit(400, None)], 10).is_empty());
    }

    #[test]
    fn excerpt_truncates_on_chars() {
        assert_eq!(excerpt("a  b\nc", 10), "a b c");
        assert_eq!(excerpt("abcdef", 3), "abc…");
    }
}
