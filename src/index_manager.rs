//! Backend connection and index (re)creation.

use postindex_core::backend::{BackendError, CreateIndexRequest, SearchBackend};

use crate::error::IngestError;
use crate::progress::{IngestEvent, IngestReporter};
use crate::retry::{retry_fixed, RetryPolicy};

/// Ping the backend until it answers or `policy` is exhausted.
pub async fn connect<B: SearchBackend + ?Sized>(
    backend: &B,
    policy: RetryPolicy,
    reporter: &dyn IngestReporter,
) -> Result<(), IngestError> {
    retry_fixed(
        policy,
        || backend.ping(),
        |attempt, err| {
            tracing::warn!(attempt, attempts = policy.attempts, error = %err, "search backend not ready");
            reporter.report(IngestEvent::ConnectRetry {
                attempt,
                attempts: policy.attempts,
                error: err.to_string(),
            });
        },
    )
    .await
    .map_err(|exhausted| IngestError::BackendUnavailable {
        attempts: exhausted.attempts,
        last: exhausted.last,
    })?;
    tracing::info!("connected to search backend");
    Ok(())
}

/// Drop `index` if present, then create it from `body`.
///
/// Between the delete and the create the index does not exist; searches in
/// that window fail.
pub async fn rebuild_index<B: SearchBackend + ?Sized>(
    backend: &B,
    index: &str,
    body: &CreateIndexRequest,
) -> Result<(), IngestError> {
    let setup_err = |source: BackendError| IngestError::IndexSetup {
        index: index.to_string(),
        source,
    };

    if backend.index_exists(index).await.map_err(setup_err)? {
        tracing::info!(index, "deleting existing index");
        backend.delete_index(index).await.map_err(setup_err)?;
    }
    backend.create_index(index, body).await.map_err(setup_err)?;
    tracing::info!(
        index,
        shards = body.settings.number_of_shards,
        replicas = body.settings.number_of_replicas,
        "index created"
    );
    Ok(())
}
