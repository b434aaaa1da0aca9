//! Core data models for the ingestion pipeline.
//!
//! [`Item`]s are transient values produced from the source list; once
//! enriched and committed they become [`IndexRecord`]s owned by the store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Key under which the enricher stores a document summary.
pub const DERIVED_SUMMARY: &str = "summary";

/// Kind of content an item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Document,
    Image,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Document => "document",
            ItemKind::Image => "image",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of ingestion.
///
/// For documents `content` is the page text; for images it is the caption
/// (possibly empty until the enricher fills it in). `encoded_payload` holds
/// the image bytes as uppercase base16.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub kind: ItemKind,
    pub content: String,
    pub source: String,
    pub title: String,
    pub encoded_payload: Option<String>,
    pub derived: BTreeMap<String, String>,
}

impl Item {
    pub fn document(
        source: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: ItemKind::Document,
            content: content.into(),
            source: source.into(),
            title: title.into(),
            encoded_payload: None,
            derived: BTreeMap::new(),
        }
    }

    /// Build an image item from raw bytes. The caption may be empty.
    pub fn image(source: impl Into<String>, bytes: &[u8], caption: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Image,
            content: caption.into(),
            source: source.into(),
            title: String::new(),
            encoded_payload: Some(hex::encode_upper(bytes)),
            derived: BTreeMap::new(),
        }
    }

    /// Identity fields in canonical order: `(source, title)` for documents,
    /// the encoded payload alone for images.
    pub fn identity_fields(&self) -> Vec<&str> {
        match self.kind {
            ItemKind::Document => vec![self.source.as_str(), self.title.as_str()],
            ItemKind::Image => vec![self.encoded_payload.as_deref().unwrap_or("")],
        }
    }

    /// Decode the image payload back into raw bytes.
    pub fn payload_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let encoded = self
            .encoded_payload
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("item {} has no encoded payload", self.source))?;
        Ok(hex::decode(encoded)?)
    }
}

/// Fixed-length (128-bit) content identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub [u8; 16]);

impl Fingerprint {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("fingerprint must be 16 bytes: {}", s))?;
        Ok(Fingerprint(arr))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Metadata persisted alongside each record's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub kind: ItemKind,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_payload: Option<String>,
    /// Remaining enricher output not covered by the named fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub derived: BTreeMap<String, String>,
}

/// The unit persisted inside the index store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: Uuid,
    pub fingerprint: Fingerprint,
    pub content: String,
    pub metadata: RecordMetadata,
    pub indexed_at: DateTime<Utc>,
}

impl IndexRecord {
    /// Convert an enriched item into a record, consuming it.
    pub fn from_item(item: Item, fingerprint: Fingerprint) -> Self {
        let Item {
            kind,
            content,
            source,
            title,
            encoded_payload,
            mut derived,
        } = item;
        let summary = derived.remove(DERIVED_SUMMARY);
        let title = match kind {
            ItemKind::Document => Some(title),
            ItemKind::Image if title.is_empty() => None,
            ItemKind::Image => Some(title),
        };

        Self {
            id: Uuid::new_v4(),
            fingerprint,
            content,
            metadata: RecordMetadata {
                kind,
                source,
                title,
                summary,
                encoded_payload,
                derived,
            },
            indexed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_payload_is_uppercase_base16() {
        let item = Item::image("img/a.png", &[0xde, 0xad, 0x01], "");
        assert_eq!(item.encoded_payload.as_deref(), Some("DEAD01"));
        assert_eq!(item.payload_bytes().unwrap(), vec![0xde, 0xad, 0x01]);
    }

    #[test]
    fn fingerprint_hex_roundtrip() {
        let fp = Fingerprint([7u8; 16]);
        let parsed: Fingerprint = fp.to_hex().parse().unwrap();
        assert_eq!(fp, parsed);
        assert!("abcd".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn record_moves_summary_out_of_derived() {
        let mut item = Item::document("https://a/1", "One", "body");
        item.derived
            .insert(DERIVED_SUMMARY.to_string(), "short".to_string());
        item.derived.insert("lang".to_string(), "en".to_string());

        let record = IndexRecord::from_item(item, Fingerprint([0u8; 16]));
        assert_eq!(record.metadata.summary.as_deref(), Some("short"));
        assert_eq!(record.metadata.derived.get("lang").map(String::as_str), Some("en"));
        assert_eq!(record.metadata.title.as_deref(), Some("One"));
        assert_eq!(record.content, "body");
    }
}
