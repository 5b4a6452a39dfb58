//! Retrieval engine: search execution and month aggregation.
//!
//! Both functions operate entirely through the [`SearchBackend`] trait, with
//! no HTTP or configuration dependencies. The calling application supplies
//! the backend, the index name, and [`QueryOptions`].
//!
//! Searches fetch the full matching set in one call (up to
//! `result_cap`) sorted by `datetime` descending; pagination happens
//! client-side with [`paginate`](crate::paginate::paginate). Backend errors
//! are returned as [`QueryError::Backend`] and never retried.

use crate::backend::SearchBackend;
use crate::models::{MonthBucket, SearchHit};
use crate::query::{
    build_month_histogram, build_search_query, month_label, QueryError, QueryOptions,
    SearchRequest,
};

/// Run a keyword/date search and return hits in backend order.
pub async fn search_posts<B: SearchBackend + ?Sized>(
    backend: &B,
    index: &str,
    req: &SearchRequest,
    opts: &QueryOptions,
) -> Result<Vec<SearchHit>, QueryError> {
    let query = build_search_query(req, opts)?;
    let response = backend.search(index, &query).await?;
    Ok(response
        .hits
        .hits
        .into_iter()
        .map(|hit| SearchHit {
            id: hit.id,
            score: hit.score,
            post: hit.source,
        })
        .collect())
}

/// Count posts per calendar month, oldest first, as the backend orders
/// buckets.
pub async fn posts_per_month<B: SearchBackend + ?Sized>(
    backend: &B,
    index: &str,
    opts: &QueryOptions,
) -> Result<Vec<MonthBucket>, QueryError> {
    let request = build_month_histogram(opts);
    let response = backend.aggregate(index, &request).await?;
    response
        .aggregations
        .posts_per_month
        .buckets
        .into_iter()
        .map(|bucket| {
            let label = month_label(bucket.key, opts.offset)
                .ok_or_else(|| QueryError::Decode(format!("bucket key {}", bucket.key)))?;
            Ok(MonthBucket {
                label,
                count: bucket.doc_count,
            })
        })
        .collect()
}
