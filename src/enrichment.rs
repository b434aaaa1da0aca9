//! Enricher implementations.
//!
//! - **[`ExtractiveEnricher`]**: offline. The summary is the leading
//!   sentences of the text within a character budget. It cannot caption,
//!   so images must arrive with a caption.
//! - **[`OpenAiEnricher`]**: chat completions for summaries and a vision
//!   model for captions (image sent as a base64 data URL).
//!
//! Use [`create_enricher`] to pick one from config.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::Engine;

use vector_ingest_core::embedding::truncate_chars;
use vector_ingest_core::enrich::Enricher;

use crate::config::EnrichmentConfig;
use crate::http;

pub fn create_enricher(config: &EnrichmentConfig) -> Result<Arc<dyn Enricher>> {
    match config.provider.as_str() {
        "extractive" => Ok(Arc::new(ExtractiveEnricher::new(config.summary_chars))),
        "openai" => Ok(Arc::new(OpenAiEnricher::new(config)?)),
        other => bail!("Unknown enrichment provider: {}", other),
    }
}

// ============ Extractive ============

pub struct ExtractiveEnricher {
    max_chars: usize,
}

impl ExtractiveEnricher {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }
}

#[async_trait]
impl Enricher for ExtractiveEnricher {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn summarize(&self, text: &str) -> Result<String> {
        let summary = leading_sentences(text, self.max_chars);
        if summary.is_empty() {
            bail!("nothing to summarize: document text is empty");
        }
        Ok(summary)
    }

    async fn caption(&self, _image: &[u8]) -> Result<String> {
        bail!("extractive enricher cannot caption images; set [enrichment] provider = \"openai\"")
    }
}

/// Whole sentences from the start of `text` while they fit in `max_chars`.
/// If the first sentence alone is too long it is cut at the last word
/// boundary that fits.
fn leading_sentences(text: &str, max_chars: usize) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= max_chars {
        return normalized;
    }

    let mut out = String::new();
    let mut used = 0usize;
    for sentence in split_sentences(&normalized) {
        let len = sentence.chars().count() + usize::from(!out.is_empty());
        if used + len > max_chars {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(sentence);
        used += len;
    }
    if !out.is_empty() {
        return out;
    }

    let mut cut = String::new();
    for word in normalized.split(' ') {
        let len = word.chars().count() + usize::from(!cut.is_empty());
        if cut.chars().count() + len > max_chars {
            break;
        }
        if !cut.is_empty() {
            cut.push(' ');
        }
        cut.push_str(word);
    }
    if cut.is_empty() {
        normalized.chars().take(max_chars).collect()
    } else {
        cut
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?') && bytes.get(i + 1).map_or(true, |n| *n == b' ') {
            out.push(text[start..=i].trim());
            start = i + 1;
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

// ============ OpenAI ============

const SUMMARY_PROMPT: &str = "Summarize the following text:\n\n{text}\n\nSummary:";
const CAPTION_PROMPT: &str = "Describe this image in one or two sentences for a search index.";

pub struct OpenAiEnricher {
    model: String,
    vision_model: String,
    max_tokens: u32,
    max_input_chars: usize,
    max_retries: u32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiEnricher {
    pub fn new(config: &EnrichmentConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: config.model.clone(),
            vision_model: config.vision_model.clone(),
            max_tokens: config.max_tokens,
            max_input_chars: config.max_input_chars,
            max_retries: config.max_retries,
            api_key,
            client: http::client(config.timeout_secs)?,
        })
    }

    async fn chat(&self, model: &str, content: serde_json::Value) -> Result<String> {
        let body = serde_json::json!({
            "model": model,
            "max_tokens": self.max_tokens,
            "temperature": 0.0,
            "messages": [{ "role": "user", "content": content }],
        });
        let json = http::post_json(
            &self.client,
            "https://api.openai.com/v1/chat/completions",
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_chat_response(&json)
    }
}

#[async_trait]
impl Enricher for OpenAiEnricher {
    fn name(&self) -> &str {
        "openai"
    }

    async fn summarize(&self, text: &str) -> Result<String> {
        let prompt = summary_prompt(text, self.max_input_chars);
        self.chat(&self.model, serde_json::Value::String(prompt)).await
    }

    async fn caption(&self, image: &[u8]) -> Result<String> {
        let mime = image_mime(image)
            .ok_or_else(|| anyhow::anyhow!("unsupported image format (expected PNG or JPEG)"))?;
        let data_url = format!(
            "data:{};base64,{}",
            mime,
            base64::engine::general_purpose::STANDARD.encode(image)
        );
        let content = serde_json::json!([
            { "type": "text", "text": CAPTION_PROMPT },
            { "type": "image_url", "image_url": { "url": data_url } },
        ]);
        self.chat(&self.vision_model, content).await
    }
}

/// The summary prompt with `text` cut to `max_chars` characters.
fn summary_prompt(text: &str, max_chars: usize) -> String {
    SUMMARY_PROMPT.replace("{text}", truncate_chars(text, max_chars))
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))?
        .trim()
        .to_string();
    if text.is_empty() {
        bail!("OpenAI returned an empty completion");
    }
    Ok(text)
}

fn image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else {
        None
    }
}
