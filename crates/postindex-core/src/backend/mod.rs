//! Search backend abstraction for postindex.
//!
//! The [`SearchBackend`] trait covers every operation the ingestion pipeline
//! and retrieval engine need from an Elasticsearch-compatible service. All
//! request and response bodies are explicit serde types; a response that
//! does not match its type is a [`BackendError::Decode`], never a silent
//! fallback to some other shape.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Method | Wire call |
//! |--------|-----------|
//! | [`ping`](SearchBackend::ping) | `HEAD /` |
//! | [`index_exists`](SearchBackend::index_exists) | `HEAD /{index}` |
//! | [`delete_index`](SearchBackend::delete_index) | `DELETE /{index}` |
//! | [`create_index`](SearchBackend::create_index) | `PUT /{index}` |
//! | [`index_document`](SearchBackend::index_document) | `POST /{index}/_doc` |
//! | [`search`](SearchBackend::search) | `POST /{index}/_search` |
//! | [`aggregate`](SearchBackend::aggregate) | `POST /{index}/_search` with `size: 0` |

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::NormalizedPost;
use crate::query::{AggregationRequest, SearchQuery};

/// Failure talking to the search backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The request never got an HTTP response.
    #[error("search backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered with a non-success status.
    #[error("search backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("unexpected search backend response: {0}")]
    Decode(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Abstract Elasticsearch-compatible backend.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Liveness check.
    async fn ping(&self) -> BackendResult<()>;

    async fn index_exists(&self, index: &str) -> BackendResult<bool>;

    async fn delete_index(&self, index: &str) -> BackendResult<()>;

    async fn create_index(&self, index: &str, body: &CreateIndexRequest) -> BackendResult<()>;

    /// Store one document, returning the backend-assigned identity.
    async fn index_document(
        &self,
        index: &str,
        doc: &NormalizedPost,
    ) -> BackendResult<IndexedDocument>;

    async fn search(&self, index: &str, query: &SearchQuery) -> BackendResult<SearchResponse>;

    async fn aggregate(
        &self,
        index: &str,
        request: &AggregationRequest,
    ) -> BackendResult<AggregationResponse>;
}

// ============ Index creation ============

/// Body of `PUT /{index}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIndexRequest {
    pub settings: IndexSettings,
    pub mappings: IndexMappings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMappings {
    pub properties: BTreeMap<String, FieldMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(rename = "type")]
    pub field_type: String,
}

impl FieldMapping {
    fn of(field_type: &str) -> Self {
        Self {
            field_type: field_type.to_string(),
        }
    }
}

impl CreateIndexRequest {
    /// Mapping for post documents: `content` is full-text, the time fields
    /// are dates.
    pub fn for_posts(shards: u32, replicas: u32) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("content".to_string(), FieldMapping::of("text"));
        properties.insert("creation_timestamp".to_string(), FieldMapping::of("date"));
        properties.insert("datetime".to_string(), FieldMapping::of("date"));
        properties.insert("timestamp".to_string(), FieldMapping::of("date"));
        Self {
            settings: IndexSettings {
                number_of_shards: shards,
                number_of_replicas: replicas,
            },
            mappings: IndexMappings { properties },
        }
    }
}

// ============ Document indexing ============

/// Response of `POST /{index}/_doc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub result: Option<String>,
}

// ============ Search ============

/// Response of `POST /{index}/_search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: HitsEnvelope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitsEnvelope {
    #[serde(default)]
    pub total: Option<TotalHits>,
    pub hits: Vec<RawHit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    #[serde(default)]
    pub relation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source")]
    pub source: NormalizedPost,
}

// ============ Aggregation ============

/// Response of the month histogram query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationResponse {
    pub aggregations: Aggregations,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregations {
    pub posts_per_month: HistogramResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramResult {
    pub buckets: Vec<HistogramBucket>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// Bucket start, epoch milliseconds.
    pub key: i64,
    #[serde(default)]
    pub key_as_string: Option<String>,
    pub doc_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_index_body_matches_wire_contract() {
        let body = serde_json::to_value(CreateIndexRequest::for_posts(1, 0)).unwrap();
        assert_eq!(
            body,
            json!({
                "settings": {"number_of_shards": 1, "number_of_replicas": 0},
                "mappings": {"properties": {
                    "content": {"type": "text"},
                    "creation_timestamp": {"type": "date"},
                    "datetime": {"type": "date"},
                    "timestamp": {"type": "date"}
                }}
            })
        );
    }

    #[test]
    fn decodes_elasticsearch_search_response() {
        let raw = json!({
            "took": 3,
            "timed_out": false,
            "hits": {
                "total": {"value": 1, "relation": "eq"},
                "max_score": null,
                "hits": [{
                    "_index": "ig_data",
                    "_id": "abc123",
                    "_score": null,
                    "_source": {
                        "content": "hello",
                        "datetime": "2024-03-01T00:00:00+00:00",
                        "timestamp": "2025-01-01T00:00:00+00:00",
                        "media": [{"uri": "media/posts/202403/a.jpg"}]
                    },
                    "sort": [1709251200000i64]
                }]
            }
        });
        let resp: SearchResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(resp.hits.total.unwrap().value, 1);
        assert_eq!(resp.hits.hits[0].id, "abc123");
        assert_eq!(resp.hits.hits[0].score, None);
        assert_eq!(resp.hits.hits[0].source.content, "hello");
    }

    #[test]
    fn search_response_without_hits_array_is_rejected() {
        let raw = json!({"hits": {"total": 0}});
        assert!(serde_json::from_value::<SearchResponse>(raw).is_err());
    }

    #[test]
    fn decodes_histogram_response() {
        let raw = json!({
            "hits": {"total": {"value": 7, "relation": "eq"}, "hits": []},
            "aggregations": {"posts_per_month": {"buckets": [
                {"key_as_string": "2024-03-01T00:00:00.000Z", "key": 1709251200000i64, "doc_count": 5},
                {"key_as_string": "2024-04-01T00:00:00.000Z", "key": 1711929600000i64, "doc_count": 2}
            ]}}
        });
        let resp: AggregationResponse = serde_json::from_value(raw).unwrap();
        let counts: Vec<u64> = resp
            .aggregations
            .posts_per_month
            .buckets
            .iter()
            .map(|b| b.doc_count)
            .collect();
        assert_eq!(counts, vec![5, 2]);
    }
}
