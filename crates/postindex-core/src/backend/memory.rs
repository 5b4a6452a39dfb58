//! In-memory [`SearchBackend`] implementation for testing.
//!
//! Uses `BTreeMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Emulates the subset of Elasticsearch behavior the pipeline relies on:
//! `match` is any-term, case-insensitive over alphanumeric tokens; `range`
//! compares RFC 3339 instants; sorting honors `datetime`; the month
//! histogram fills empty months between the first and last bucket.
//! Failure knobs let tests simulate an unreachable service or rejected
//! documents.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone};

use crate::models::NormalizedPost;
use crate::query::{AggregationRequest, SearchQuery, SortOrder};
use crate::transform::{parse_offset, utc_offset};

use super::{
    AggregationResponse, Aggregations, BackendError, BackendResult, CreateIndexRequest,
    HistogramBucket, HistogramResult, HitsEnvelope, IndexedDocument, RawHit, SearchBackend,
    SearchResponse, TotalHits,
};

struct StoredIndex {
    mapping: Option<CreateIndexRequest>,
    docs: Vec<(String, NormalizedPost)>,
}

/// In-memory search backend for tests.
pub struct MemoryBackend {
    indices: RwLock<BTreeMap<String, StoredIndex>>,
    operations: RwLock<Vec<String>>,
    failing_pings: AtomicUsize,
    reject_content: Option<String>,
    pings: AtomicUsize,
    searches: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(BTreeMap::new()),
            operations: RwLock::new(Vec::new()),
            failing_pings: AtomicUsize::new(0),
            reject_content: None,
            pings: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
        }
    }

    /// Fail the first `n` pings, then answer normally.
    pub fn with_failing_pings(self, n: usize) -> Self {
        self.failing_pings.store(n, Ordering::SeqCst);
        self
    }

    /// Never answer a ping.
    pub fn unreachable() -> Self {
        Self::new().with_failing_pings(usize::MAX)
    }

    /// Reject any document whose content contains `needle`.
    pub fn rejecting_content(mut self, needle: &str) -> Self {
        self.reject_content = Some(needle.to_string());
        self
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    /// Index-level operations in the order they happened
    /// (`"delete ig_data"`, `"create ig_data"`).
    pub fn operations(&self) -> Vec<String> {
        self.operations.read().unwrap().clone()
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.indices.read().unwrap().contains_key(index)
    }

    /// Documents in insertion order.
    pub fn documents(&self, index: &str) -> Vec<NormalizedPost> {
        self.indices
            .read()
            .unwrap()
            .get(index)
            .map(|i| i.docs.iter().map(|(_, d)| d.clone()).collect())
            .unwrap_or_default()
    }

    pub fn mapping(&self, index: &str) -> Option<CreateIndexRequest> {
        self.indices
            .read()
            .unwrap()
            .get(index)
            .and_then(|i| i.mapping.clone())
    }

    fn record(&self, op: String) {
        self.operations.write().unwrap().push(op);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(index: &str) -> BackendError {
    BackendError::Status {
        status: 404,
        body: format!("index_not_found_exception: no such index [{}]", index),
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn parse_instant(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

/// Number of query terms present in `content`, or `None` for no match.
fn match_score(content: &str, keyword: &str) -> Option<f64> {
    let doc_tokens = tokens(content);
    let hits = tokens(keyword)
        .iter()
        .filter(|t| doc_tokens.contains(t))
        .count();
    (hits > 0).then_some(hits as f64)
}

fn in_range(post: &NormalizedPost, query: &SearchQuery) -> bool {
    let Some(range) = query.date_range() else {
        return true;
    };
    let Some(at) = parse_instant(&post.datetime) else {
        return false;
    };
    let lower_ok = range
        .gte
        .as_deref()
        .and_then(parse_instant)
        .map_or(true, |gte| at >= gte);
    let upper_ok = range
        .lte
        .as_deref()
        .and_then(parse_instant)
        .map_or(true, |lte| at <= lte);
    lower_ok && upper_ok
}

fn month_start_ms(year: i32, month: u32, offset: &FixedOffset) -> Option<i64> {
    let date = NaiveDate::from_ymd_opt(year, month, 1)?;
    offset
        .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
        .single()
        .map(|dt| dt.timestamp_millis())
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn ping(&self) -> BackendResult<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_pings.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.failing_pings.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(BackendError::Unreachable("connection refused".to_string()));
        }
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> BackendResult<bool> {
        Ok(self.has_index(index))
    }

    async fn delete_index(&self, index: &str) -> BackendResult<()> {
        let removed = self.indices.write().unwrap().remove(index);
        if removed.is_none() {
            return Err(not_found(index));
        }
        self.record(format!("delete {}", index));
        Ok(())
    }

    async fn create_index(&self, index: &str, body: &CreateIndexRequest) -> BackendResult<()> {
        {
            let mut indices = self.indices.write().unwrap();
            if indices.contains_key(index) {
                return Err(BackendError::Status {
                    status: 400,
                    body: format!("resource_already_exists_exception: [{}]", index),
                });
            }
            indices.insert(
                index.to_string(),
                StoredIndex {
                    mapping: Some(body.clone()),
                    docs: Vec::new(),
                },
            );
        }
        self.record(format!("create {}", index));
        Ok(())
    }

    async fn index_document(
        &self,
        index: &str,
        doc: &NormalizedPost,
    ) -> BackendResult<IndexedDocument> {
        if let Some(needle) = &self.reject_content {
            if doc.content.contains(needle.as_str()) {
                return Err(BackendError::Status {
                    status: 400,
                    body: "document_parsing_exception".to_string(),
                });
            }
        }
        let id = uuid::Uuid::new_v4().simple().to_string();
        let mut indices = self.indices.write().unwrap();
        // Like the real service, indexing into a missing index creates it.
        let stored = indices
            .entry(index.to_string())
            .or_insert_with(|| StoredIndex {
                mapping: None,
                docs: Vec::new(),
            });
        stored.docs.push((id.clone(), doc.clone()));
        Ok(IndexedDocument {
            id,
            result: Some("created".to_string()),
        })
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> BackendResult<SearchResponse> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let indices = self.indices.read().unwrap();
        let stored = indices.get(index).ok_or_else(|| not_found(index))?;

        let mut hits: Vec<RawHit> = stored
            .docs
            .iter()
            .filter(|(_, post)| in_range(post, query))
            .filter_map(|(id, post)| {
                let score = match query.keyword() {
                    Some(keyword) => match_score(&post.content, keyword)?,
                    None => 1.0,
                };
                Some(RawHit {
                    id: id.clone(),
                    score: Some(score),
                    source: post.clone(),
                })
            })
            .collect();

        let datetime_order = query
            .sort
            .iter()
            .find_map(|s| s.get("datetime"))
            .map(|s| s.order);
        match datetime_order {
            Some(order) => {
                hits.sort_by_key(|h| parse_instant(&h.source.datetime));
                if order == SortOrder::Desc {
                    hits.reverse();
                }
                // Field-sorted hits carry no score.
                for hit in &mut hits {
                    hit.score = None;
                }
            }
            None => hits.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
        }

        let total = hits.len() as u64;
        hits.truncate(query.size);
        Ok(SearchResponse {
            hits: HitsEnvelope {
                total: Some(TotalHits {
                    value: total,
                    relation: Some("eq".to_string()),
                }),
                hits,
            },
        })
    }

    async fn aggregate(
        &self,
        index: &str,
        request: &AggregationRequest,
    ) -> BackendResult<AggregationResponse> {
        let histogram = &request.aggs.posts_per_month.date_histogram;
        let offset = parse_offset(&histogram.time_zone).unwrap_or_else(utc_offset);

        let indices = self.indices.read().unwrap();
        let stored = indices.get(index).ok_or_else(|| not_found(index))?;

        let mut counts: BTreeMap<(i32, u32), u64> = BTreeMap::new();
        for (_, post) in &stored.docs {
            if let Some(at) = parse_instant(&post.datetime) {
                let local = at.with_timezone(&offset);
                *counts.entry((local.year(), local.month())).or_default() += 1;
            }
        }

        let mut buckets = Vec::new();
        if let (Some(&first), Some(&last)) = (counts.keys().next(), counts.keys().next_back()) {
            let mut cursor = first;
            while cursor <= last {
                let key = month_start_ms(cursor.0, cursor.1, &offset)
                    .ok_or_else(|| BackendError::Decode(format!("month {:?}", cursor)))?;
                buckets.push(HistogramBucket {
                    key,
                    key_as_string: None,
                    doc_count: counts.get(&cursor).copied().unwrap_or(0),
                });
                cursor = next_month(cursor.0, cursor.1);
            }
        }

        Ok(AggregationResponse {
            aggregations: Aggregations {
                posts_per_month: HistogramResult { buckets },
            },
        })
    }
}
