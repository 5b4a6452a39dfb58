//! Document loading.
//!
//! Posts are indexed one request at a time, in transform order. A rejected
//! document is recorded and the loop moves on; the run only fails on errors
//! raised before loading starts.

use serde::Serialize;

use postindex_core::backend::SearchBackend;
use postindex_core::models::NormalizedPost;

use crate::progress::{IngestEvent, IngestReporter};

/// Report progress every this many documents.
const PROGRESS_EVERY: usize = 100;

/// One document the backend did not accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    /// Position in the submitted list.
    pub position: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Backend-assigned ids, in load order.
    pub indexed: Vec<String>,
    pub failures: Vec<LoadFailure>,
}

pub async fn load_documents<B: SearchBackend + ?Sized>(
    backend: &B,
    index: &str,
    posts: &[NormalizedPost],
    reporter: &dyn IngestReporter,
) -> LoadReport {
    let total = posts.len();
    let mut report = LoadReport::default();

    for (position, post) in posts.iter().enumerate() {
        match backend.index_document(index, post).await {
            Ok(doc) => {
                tracing::info!(id = %doc.id, "indexed document");
                report.indexed.push(doc.id);
            }
            Err(e) => {
                tracing::error!(position, error = %e, "failed to index document");
                reporter.report(IngestEvent::LoadFailed {
                    position,
                    error: e.to_string(),
                });
                report.failures.push(LoadFailure {
                    position,
                    error: e.to_string(),
                });
            }
        }

        let done = position + 1;
        if done % PROGRESS_EVERY == 0 || done == total {
            reporter.report(IngestEvent::Loading {
                n: done as u64,
                total: total as u64,
            });
        }
    }

    tracing::info!(
        indexed = report.indexed.len(),
        failed = report.failures.len(),
        "documents loaded"
    );
    report
}
