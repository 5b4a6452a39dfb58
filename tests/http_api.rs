//! HTTP API tests.
//!
//! The router is served on an ephemeral port over the in-memory backend and
//! exercised with a real HTTP client.

mod common;

use std::sync::Arc;

use common::{sample_archive, sample_posts, Workspace};
use postindex::server::router;
use postindex_core::backend::memory::MemoryBackend;
use postindex_core::backend::SearchBackend;
use postindex_core::models::{MediaReference, NormalizedPost};
use serde_json::{json, Value};

async fn serve(ws: &Workspace, backend: Arc<MemoryBackend>) -> String {
    let app = router(Arc::new(ws.config.clone()), backend);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn post(content: &str, datetime: &str) -> NormalizedPost {
    NormalizedPost {
        content: content.to_string(),
        datetime: datetime.to_string(),
        timestamp: "2024-12-01T00:00:00+00:00".to_string(),
        media: vec![MediaReference::new("media/posts/202403/a.jpg")],
    }
}

/// 23 beach posts across three months plus one unrelated post.
async fn seeded_backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    for day in 1..=23 {
        let month = if day <= 10 { 3 } else { 5 };
        let datetime = format!("2024-{:02}-{:02}T12:00:00+00:00", month, day);
        backend
            .index_document("ig_data", &post(&format!("beach {}", day), &datetime))
            .await
            .unwrap();
    }
    backend
        .index_document("ig_data", &post("mountain", "2024-04-02T12:00:00+00:00"))
        .await
        .unwrap();
    backend
}

async fn get_json(url: &str) -> (u16, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn health_reports_version() {
    let ws = Workspace::new();
    let base = serve(&ws, Arc::new(MemoryBackend::new())).await;
    let (status, body) = get_json(&format!("{}/health", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn search_paginates_newest_first() {
    let ws = Workspace::new();
    let base = serve(&ws, seeded_backend().await).await;

    let (status, body) = get_json(&format!("{}/search?q=beach", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["total_items"], 23);
    assert_eq!(body["total_pages"], 3);
    assert_eq!(body["page"], 1);
    assert_eq!(body["items"].as_array().unwrap().len(), 10);
    assert_eq!(body["items"][0]["post"]["content"], "beach 23");

    let (_, last) = get_json(&format!("{}/search?q=beach&page=3", base)).await;
    assert_eq!(last["items"].as_array().unwrap().len(), 3);

    let (_, clamped) = get_json(&format!("{}/search?q=beach&page=99", base)).await;
    assert_eq!(clamped["page"], 3);
}

#[tokio::test]
async fn search_by_date_range_only() {
    let ws = Workspace::new();
    let base = serve(&ws, seeded_backend().await).await;
    let (status, body) =
        get_json(&format!("{}/search?from=2024-04-01&to=2024-04-30", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["total_items"], 1);
    assert_eq!(body["items"][0]["post"]["content"], "mountain");
}

#[tokio::test]
async fn invalid_requests_use_error_envelope() {
    let ws = Workspace::new();
    let backend = Arc::new(MemoryBackend::new());
    let base = serve(&ws, backend.clone()).await;

    let (status, body) = get_json(&format!("{}/search", base)).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = get_json(&format!("{}/search?from=2024-05-01&to=2024-04-01", base)).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = get_json(&format!("{}/search?from=yesterday", base)).await;
    assert_eq!(status, 400);
    assert_eq!(backend.search_count(), 0);
}

#[tokio::test]
async fn missing_index_is_backend_error() {
    let ws = Workspace::new();
    let base = serve(&ws, Arc::new(MemoryBackend::new())).await;
    let (status, body) = get_json(&format!("{}/search?q=beach", base)).await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "backend_error");
}

#[tokio::test]
async fn trend_returns_month_buckets() {
    let ws = Workspace::new();
    let base = serve(&ws, seeded_backend().await).await;
    let (status, body) = get_json(&format!("{}/trend", base)).await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!([
            {"label": "2024-03", "count": 10},
            {"label": "2024-04", "count": 1},
            {"label": "2024-05", "count": 13}
        ])
    );
}

#[tokio::test]
async fn ingest_then_serve_media() {
    let ws = Workspace::new();
    sample_archive(&ws.archive_path("export.zip"), &sample_posts());
    let backend = Arc::new(MemoryBackend::new());
    let base = serve(&ws, backend.clone()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/ingest", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["report"]["indexed"], 2);
    assert!(body["events"].as_array().unwrap().len() > 9);
    assert_eq!(backend.documents("ig_data").len(), 2);

    let media = reqwest::get(format!("{}/media/posts/202403/spring.jpg", base))
        .await
        .unwrap();
    assert_eq!(media.status().as_u16(), 200);
    assert_eq!(media.bytes().await.unwrap().as_ref(), b"spring-bytes");
}

#[tokio::test]
async fn ingest_failure_is_reported_in_outcome() {
    let ws = Workspace::new();
    let base = serve(&ws, Arc::new(MemoryBackend::new())).await;
    let response = reqwest::Client::new()
        .post(format!("{}/ingest", base))
        .json(&json!({"archive": ws.root().join("nope.zip")}))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("does not exist"));
}

#[tokio::test]
async fn malformed_ingest_body_is_bad_request() {
    let ws = Workspace::new();
    let base = serve(&ws, Arc::new(MemoryBackend::new())).await;
    let response = reqwest::Client::new()
        .post(format!("{}/ingest", base))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn bad_page_parameter_uses_error_envelope() {
    let ws = Workspace::new();
    let base = serve(&ws, seeded_backend().await).await;
    let (status, body) = get_json(&format!("{}/search?q=beach&page=-1", base)).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"].as_str().unwrap().contains("page"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_ingest_is_rejected_as_busy() {
    let mut ws = Workspace::new();
    // An unreachable backend keeps the first run in its retry loop for ~2s.
    ws.config.backend.retry_interval_secs = 1;
    sample_archive(&ws.archive_path("export.zip"), &sample_posts());
    let base = serve(&ws, Arc::new(MemoryBackend::unreachable())).await;
    let client = reqwest::Client::new();

    let (first, second) = tokio::join!(
        client.post(format!("{}/ingest", base)).send(),
        client.post(format!("{}/ingest", base)).send(),
    );
    let mut statuses = Vec::new();
    let mut busy = None;
    for response in [first.unwrap(), second.unwrap()] {
        let status = response.status().as_u16();
        let body: Value = response.json().await.unwrap();
        if status == 409 {
            busy = Some(body.clone());
        }
        statuses.push(status);
    }
    statuses.sort();

    assert_eq!(statuses, vec![200, 409]);
    assert_eq!(busy.unwrap()["error"]["code"], "busy");
}
