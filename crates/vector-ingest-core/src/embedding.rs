//! Embedding collaborator trait and vector utilities.
//!
//! [`Embedder`] is the seam to whatever model turns text into a
//! fixed-length vector. Concrete providers (OpenAI, Ollama, fastembed)
//! live in the `vector-ingest` app crate; tests use deterministic fakes.
//!
//! The helpers here encode vectors for the on-disk index artifact and
//! score similarity for search.

use anyhow::Result;
use async_trait::async_trait;

/// Text used to discover an embedder's dimensionality when bootstrapping
/// an empty store.
pub const PROBE_TEXT: &str = "hello world";

/// Default cap, in characters, on one input sent to a hosted model.
/// About 6k tokens at four characters per token.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 24_000;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded in the persisted index.
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single text.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    embedder
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Embed the probe text and return the vector length.
pub async fn probe_dims(embedder: &dyn Embedder) -> Result<usize> {
    let v = embed_one(embedder, PROBE_TEXT).await?;
    if v.is_empty() {
        anyhow::bail!("embedder {} returned an empty probe vector", embedder.model_name());
    }
    Ok(v.len())
}

/// The first `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Append a vector as little-endian `f32` bytes.
pub fn write_vec_le(out: &mut Vec<u8>, vec: &[f32]) {
    out.reserve(vec.len() * 4);
    for &v in vec {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// Decode little-endian `f32` bytes. Trailing bytes short of a full `f32`
/// are ignored.
pub fn read_vec_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched
/// vectors and for zero-magnitude inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<f32>);

    #[async_trait]
    impl Embedder for Fixed {
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }
    }

    #[test]
    fn le_bytes_roundtrip() {
        let v = vec![1.0f32, -2.5, 3.125, 0.0];
        let mut bytes = Vec::new();
        write_vec_le(&mut bytes, &v);
        assert_eq!(bytes.len(), 16);
        assert_eq!(read_vec_le(&bytes), v);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("", 3), "");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
    }

    #[test]
    fn cosine_cases() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn probe_reports_length() {
        assert_eq!(probe_dims(&Fixed(vec![0.1; 8])).await.unwrap(), 8);
        assert!(probe_dims(&Fixed(Vec::new())).await.is_err());
    }
}
