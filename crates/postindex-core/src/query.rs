//! Query construction for the retrieval engine.
//!
//! A [`SearchRequest`] (keyword and/or calendar-date range) becomes a
//! conjunctive `bool` query: a `match` on `content` for the keyword and a
//! `range` on `datetime` whose bounds cover whole days in a fixed offset.
//! A request with neither part is rejected here, before any backend call.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::backend::BackendError;
use crate::transform::utc_offset;

/// Upper bound on hits fetched per search. Matches the backend's default
/// `index.max_result_window`.
pub const DEFAULT_RESULT_CAP: usize = 10_000;

/// Name of the month histogram aggregation in requests and responses.
pub const MONTH_AGGREGATION: &str = "posts_per_month";

/// Retrieval failure. Aborts only the current request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("enter a keyword or a date range to search")]
    EmptyRequest,

    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("start date {start} is after end date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("could not decode aggregation bucket: {0}")]
    Decode(String),
}

/// A user's search input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    pub keyword: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl SearchRequest {
    /// Build a request from raw text inputs (`YYYY-MM-DD` dates). Blank
    /// inputs count as absent.
    pub fn parse(
        keyword: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Self, QueryError> {
        Ok(Self {
            keyword: non_blank(keyword).map(str::to_string),
            start: non_blank(start).map(parse_date).transpose()?,
            end: non_blank(end).map(parse_date).transpose()?,
        })
    }

    fn keyword(&self) -> Option<&str> {
        non_blank(self.keyword.as_deref())
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> Result<NaiveDate, QueryError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| QueryError::InvalidDate(s.to_string()))
}

/// Retrieval tuning, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Offset applied to date-range bounds and histogram buckets.
    pub offset: FixedOffset,
    /// `size` sent with every search.
    pub result_cap: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            offset: utc_offset(),
            result_cap: DEFAULT_RESULT_CAP,
        }
    }
}

// ============ Search body ============

/// Body of a search call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuery {
    pub query: QueryClause,
    pub sort: Vec<BTreeMap<String, FieldSort>>,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryClause {
    #[serde(rename = "bool")]
    pub bool_query: BoolQuery,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoolQuery {
    pub must: Vec<MustClause>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MustClause {
    Match(MatchClause),
    Range(RangeClause),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchClause {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeClause {
    pub datetime: DateRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSort {
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SearchQuery {
    /// Keyword clause, if any.
    pub fn keyword(&self) -> Option<&str> {
        self.query.bool_query.must.iter().find_map(|c| match c {
            MustClause::Match(m) => Some(m.content.as_str()),
            _ => None,
        })
    }

    /// Date range clause, if any.
    pub fn date_range(&self) -> Option<&DateRange> {
        self.query.bool_query.must.iter().find_map(|c| match c {
            MustClause::Range(r) => Some(&r.datetime),
            _ => None,
        })
    }
}

/// Translate a request into a backend query, newest posts first.
pub fn build_search_query(
    req: &SearchRequest,
    opts: &QueryOptions,
) -> Result<SearchQuery, QueryError> {
    let keyword = req.keyword();
    if keyword.is_none() && req.start.is_none() && req.end.is_none() {
        return Err(QueryError::EmptyRequest);
    }
    if let (Some(start), Some(end)) = (req.start, req.end) {
        if start > end {
            return Err(QueryError::InvertedRange { start, end });
        }
    }

    let mut must = Vec::new();
    if let Some(keyword) = keyword {
        must.push(MustClause::Match(MatchClause {
            content: keyword.to_string(),
        }));
    }
    if req.start.is_some() || req.end.is_some() {
        must.push(MustClause::Range(RangeClause {
            datetime: DateRange {
                gte: req.start.map(|d| day_bound(d, "00:00:00", opts.offset)),
                lte: req.end.map(|d| day_bound(d, "23:59:59", opts.offset)),
            },
        }));
    }

    let mut sort = BTreeMap::new();
    sort.insert(
        "datetime".to_string(),
        FieldSort {
            order: SortOrder::Desc,
        },
    );

    Ok(SearchQuery {
        query: QueryClause {
            bool_query: BoolQuery { must },
        },
        sort: vec![sort],
        size: opts.result_cap,
    })
}

fn day_bound(date: NaiveDate, time: &str, offset: FixedOffset) -> String {
    format!("{}T{}{}", date.format("%Y-%m-%d"), time, offset)
}

// ============ Aggregation body ============

/// Zero-hit search carrying only the month histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationRequest {
    pub size: usize,
    pub aggs: AggregationSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationSpec {
    pub posts_per_month: DateHistogramAgg,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateHistogramAgg {
    pub date_histogram: DateHistogram,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateHistogram {
    pub field: String,
    pub calendar_interval: String,
    pub time_zone: String,
}

/// Month histogram over `datetime`.
pub fn build_month_histogram(opts: &QueryOptions) -> AggregationRequest {
    AggregationRequest {
        size: 0,
        aggs: AggregationSpec {
            posts_per_month: DateHistogramAgg {
                date_histogram: DateHistogram {
                    field: "datetime".to_string(),
                    calendar_interval: "month".to_string(),
                    time_zone: opts.offset.to_string(),
                },
            },
        },
    }
}

/// `YYYY-MM` label for a bucket key (epoch milliseconds) in `offset`.
pub fn month_label(key_ms: i64, offset: FixedOffset) -> Option<String> {
    DateTime::from_timestamp_millis(key_ms)
        .map(|dt| dt.with_timezone(&offset).format("%Y-%m").to_string())
}
