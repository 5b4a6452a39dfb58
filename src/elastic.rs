//! Elasticsearch HTTP backend.
//!
//! Implements [`SearchBackend`] over the service's REST API with `reqwest`.
//! Requests and responses use the typed bodies from
//! [`postindex_core::backend`] and [`postindex_core::query`]; a response
//! that does not decode into its type is reported as
//! [`BackendError::Decode`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::instrument;

use postindex_core::backend::{
    AggregationResponse, BackendError, BackendResult, CreateIndexRequest, IndexedDocument,
    SearchBackend, SearchResponse,
};
use postindex_core::models::NormalizedPost;
use postindex_core::query::{AggregationRequest, SearchQuery};

use crate::config::BackendConfig;

/// Bodies longer than this are truncated in error messages.
const MAX_ERROR_BODY: usize = 512;

pub struct ElasticBackend {
    base_url: String,
    client: reqwest::Client,
}

impl ElasticBackend {
    pub fn new(base_url: &str, timeout: Duration) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &BackendConfig) -> BackendResult<Self> {
        Self::new(&config.url, Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
    }

    async fn send(&self, request: RequestBuilder) -> BackendResult<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))
    }

    /// Send and require a 2xx status.
    async fn send_ok(&self, request: RequestBuilder) -> BackendResult<reqwest::Response> {
        let response = self.send(request).await?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(status_error(response).await)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> BackendResult<T> {
        let response = self.send_ok(request).await?;
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

async fn status_error(response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
        body.push_str("...");
    }
    BackendError::Status { status, body }
}

#[async_trait]
impl SearchBackend for ElasticBackend {
    async fn ping(&self) -> BackendResult<()> {
        self.send_ok(self.client.head(format!("{}/", self.base_url)))
            .await
            .map(|_| ())
    }

    async fn index_exists(&self, index: &str) -> BackendResult<bool> {
        let response = self.send(self.request(Method::HEAD, index)).await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error(response).await),
        }
    }

    #[instrument(skip(self))]
    async fn delete_index(&self, index: &str) -> BackendResult<()> {
        self.send_ok(self.request(Method::DELETE, index)).await?;
        Ok(())
    }

    #[instrument(skip(self, body))]
    async fn create_index(&self, index: &str, body: &CreateIndexRequest) -> BackendResult<()> {
        self.send_ok(self.request(Method::PUT, index).json(body))
            .await?;
        Ok(())
    }

    async fn index_document(
        &self,
        index: &str,
        doc: &NormalizedPost,
    ) -> BackendResult<IndexedDocument> {
        self.send_json(
            self.request(Method::POST, &format!("{}/_doc", index))
                .json(doc),
        )
        .await
    }

    #[instrument(skip(self, query))]
    async fn search(&self, index: &str, query: &SearchQuery) -> BackendResult<SearchResponse> {
        self.send_json(
            self.request(Method::POST, &format!("{}/_search", index))
                .json(query),
        )
        .await
    }

    #[instrument(skip(self, request))]
    async fn aggregate(
        &self,
        index: &str,
        request: &AggregationRequest,
    ) -> BackendResult<AggregationResponse> {
        self.send_json(
            self.request(Method::POST, &format!("{}/_search", index))
                .json(request),
        )
        .await
    }
}
