//! Core data models used throughout postindex.
//!
//! These types represent the export records, the normalized documents that
//! land in the search index, and the results that flow back out of the
//! retrieval engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One element of the export's posts array, as found in the archive.
///
/// Every field is optional here; the transformer decides which absences are
/// tolerated and which drop the record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPostRecord {
    #[serde(default)]
    pub media: Option<Vec<MediaReference>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub creation_timestamp: Option<i64>,
}

/// A media item attached to a post.
///
/// Only `uri` is interpreted; everything else the export carries for the
/// item (its own timestamp, caption, metadata blocks) is passed through
/// untouched into the index document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaReference {
    #[serde(default)]
    pub uri: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MediaReference {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// A post after transformation. This is the document stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPost {
    /// Decoded title/caption text.
    pub content: String,
    /// Post creation time (ISO 8601 with offset).
    pub datetime: String,
    /// Ingestion wall-clock time (ISO 8601 with offset), for audit.
    pub timestamp: String,
    #[serde(default)]
    pub media: Vec<MediaReference>,
}

/// Why a raw record was dropped during transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// The element was not an object of the expected shape.
    Malformed(String),
    /// A required field (`title` or `creation_timestamp`) was absent.
    MissingField(&'static str),
    /// The title could not be repaired into valid UTF-8.
    UndecodableTitle(String),
    /// `creation_timestamp` is outside the representable range.
    InvalidTimestamp(i64),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Malformed(e) => write!(f, "malformed record: {}", e),
            SkipReason::MissingField(field) => write!(f, "missing required field '{}'", field),
            SkipReason::UndecodableTitle(e) => write!(f, "undecodable title: {}", e),
            SkipReason::InvalidTimestamp(ts) => write!(f, "invalid creation_timestamp {}", ts),
        }
    }
}

/// A record the transformer dropped, with its position in the input array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: SkipReason,
}

/// Output of a transformation pass: kept posts in input order plus skips.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformReport {
    pub posts: Vec<NormalizedPost>,
    pub skipped: Vec<SkippedRecord>,
}

impl TransformReport {
    /// Number of records examined.
    pub fn seen(&self) -> usize {
        self.posts.len() + self.skipped.len()
    }
}

/// A single search result: the stored post plus backend identity and score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    /// Relevance score. The backend omits it when results are field-sorted.
    pub score: Option<f64>,
    pub post: NormalizedPost,
}

/// One calendar month of the posting trend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthBucket {
    /// `YYYY-MM`.
    pub label: String,
    pub count: u64,
}
