//! Source list reading and per-entry loading.
//!
//! The source list is a UTF-8 file with one entry per line. Entries are
//! URLs (fetched over HTTP) or local paths (text files become documents,
//! `.png`/`.jpg`/`.jpeg` become images). Blank lines are ignored and the
//! whole file is read before any batch runs.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};

use vector_ingest_core::models::Item;

use crate::errors::IngestError;
use crate::http;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Read the source list, keeping at most `limit` non-blank entries.
pub fn read_source_list(path: &Path, limit: Option<usize>) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| IngestError::SourceRead {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let entries = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .take(limit.unwrap_or(usize::MAX))
        .collect::<Vec<_>>();

    tracing::info!(path = %path.display(), entries = entries.len(), "read source list");
    Ok(entries)
}

/// Give a source-list URL a scheme.
///
/// | Entry | Result |
/// |-------|--------|
/// | `http…` | unchanged |
/// | `//host/p` | `https://host/p` |
/// | `/p` | joined onto `base_url`, else `https:/p` |
/// | `host/p` | `https://host/p` |
pub fn normalize_url(entry: &str, base_url: Option<&str>) -> String {
    if entry.starts_with("http") {
        return entry.to_string();
    }
    if entry.starts_with("//") {
        return format!("https:{}", entry);
    }
    if entry.starts_with('/') {
        if let Some(joined) = base_url
            .and_then(|base| url::Url::parse(base).ok())
            .and_then(|base| base.join(entry).ok())
        {
            return joined.to_string();
        }
        return format!("https:{}", entry);
    }
    format!("https://{}", entry)
}

/// Turns one source-list entry into an [`Item`].
#[async_trait]
pub trait SourceLoader: Send + Sync {
    async fn load(&self, entry: &str) -> Result<Item>;
}

/// Loads local files directly and everything else over HTTP.
pub struct DefaultLoader {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl DefaultLoader {
    pub fn new(base_url: Option<String>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: http::client(timeout_secs)?,
            base_url,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Item> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("GET {} returned {}", url, status);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let body = response.bytes().await?;

        if content_type.starts_with("image/") {
            return Ok(Item::image(url, &body, ""));
        }
        let text = String::from_utf8_lossy(&body);
        if content_type.contains("html") || text.trim_start().starts_with('<') {
            let (title, content) = parse_html(&text)?;
            Ok(Item::document(url, title, content))
        } else {
            Ok(Item::document(url, "", text.trim()))
        }
    }
}

#[async_trait]
impl SourceLoader for DefaultLoader {
    async fn load(&self, entry: &str) -> Result<Item> {
        if let Some(path) = local_path(entry) {
            return load_file(&path).await;
        }
        let url = normalize_url(entry, self.base_url.as_deref());
        self.fetch(&url).await
    }
}

fn local_path(entry: &str) -> Option<PathBuf> {
    if let Some(rest) = entry.strip_prefix("file://") {
        return Some(PathBuf::from(rest));
    }
    let path = Path::new(entry);
    path.is_file().then(|| path.to_path_buf())
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

async fn load_file(path: &Path) -> Result<Item> {
    let source = path.to_string_lossy().to_string();
    if is_image_path(path) {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image: {}", path.display()))?;
        return Ok(Item::image(source, &bytes, ""));
    }

    let body = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let title = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(Item::document(source, title, body))
}

/// `<title>` and the visible text of the body, whitespace collapsed.
fn parse_html(html: &str) -> Result<(String, String)> {
    let document = Html::parse_document(html);
    let title_sel =
        Selector::parse("title").map_err(|e| anyhow::anyhow!("invalid selector: {:?}", e))?;
    let body_sel =
        Selector::parse("body").map_err(|e| anyhow::anyhow!("invalid selector: {:?}", e))?;

    let title = document
        .select(&title_sel)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .unwrap_or_default();

    let root = document
        .select(&body_sel)
        .next()
        .unwrap_or_else(|| document.root_element());
    let mut raw = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name()))
            .map(|name| matches!(name, "script" | "style" | "noscript" | "title"))
            .unwrap_or(false);
        if !hidden {
            raw.push_str(text);
            raw.push(' ');
        }
    }

    Ok((title, collapse_whitespace(&raw)))
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
