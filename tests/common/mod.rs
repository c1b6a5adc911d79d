#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use longbox::{
    application::jobs::{ImageJobConfig, ImageJobSupervisor, JobTracker},
    cache::{CacheConfig, CacheState, CacheStore, Invalidator, MemoryStore, RetryPolicy},
    infra::{
        db::SqliteRepositories,
        http::{AppState, build_router},
        storage::ImageStorage,
    },
};
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub const UPLOAD_LIMIT: usize = 1024 * 1024;

pub struct TestApp {
    pub router: Router,
    pub tracker: Arc<JobTracker>,
    pub images: TempDir,
    shutdown: CancellationToken,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn cache_status(&self) -> &str {
        self.headers
            .get("x-cache")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }
}

impl TestApp {
    /// App backed by an in-memory catalog and cache.
    pub async fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new())).await
    }

    pub async fn with_store(store: Arc<dyn CacheStore>) -> Self {
        let config = CacheConfig {
            retry: RetryPolicy {
                retries: 0,
                base_backoff_ms: 1,
                max_backoff_ms: 1,
            },
            ..CacheConfig::default()
        };
        let shutdown = CancellationToken::new();
        let invalidator = Arc::new(Invalidator::new(
            Arc::clone(&store),
            config.retry,
            shutdown.child_token(),
        ));
        let cache = CacheState::new(config, store, Arc::clone(&invalidator));
        Self::build(Some(cache), invalidator, shutdown).await
    }

    /// App with the response cache switched off.
    pub async fn uncached() -> Self {
        Self::build(None, Arc::new(Invalidator::disabled()), CancellationToken::new()).await
    }

    async fn build(
        cache: Option<CacheState>,
        invalidator: Arc<Invalidator>,
        shutdown: CancellationToken,
    ) -> Self {
        let pool = SqliteRepositories::connect("sqlite::memory:", 1)
            .await
            .expect("connect");
        SqliteRepositories::run_migrations(&pool)
            .await
            .expect("migrations");
        let repos = Arc::new(SqliteRepositories::new(pool));

        let images = TempDir::new().expect("tempdir");
        let storage = Arc::new(ImageStorage::new(images.path().to_path_buf()).expect("storage"));
        let tracker = Arc::new(JobTracker::new());
        let (jobs, _supervisor) = ImageJobSupervisor::spawn(
            ImageJobConfig::default(),
            Arc::clone(&tracker),
            invalidator,
            storage.clone(),
            shutdown.child_token(),
        );

        let state = AppState {
            repos,
            storage,
            jobs,
        };
        Self {
            router: build_router(state, cache, UPLOAD_LIMIT),
            tracker,
            images,
            shutdown,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
            .to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
    }

    pub async fn json(&self, method: Method, uri: &str, body: Value) -> TestResponse {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.send(
            Request::builder()
                .method(Method::DELETE)
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
    }

    /// Create series 1, one issue and one copy, returning `(issue_id, copy_id)`.
    pub async fn seed_copy(&self) -> (i64, i64) {
        let series = self
            .json(
                Method::POST,
                "/v1/series",
                serde_json::json!({ "series_id": 1, "title": "Saga", "publisher": "Image" }),
            )
            .await;
        assert_eq!(series.status, StatusCode::CREATED);

        let issue = self
            .json(
                Method::POST,
                "/v1/series/1/issues",
                serde_json::json!({ "issue_nr": "1", "story_arc": "Chapter One" }),
            )
            .await;
        assert_eq!(issue.status, StatusCode::CREATED);
        let issue_id = issue.json()["issue_id"].as_i64().expect("issue id");

        let copy = self
            .json(
                Method::POST,
                &format!("/v1/issues/{issue_id}/copies"),
                serde_json::json!({ "grade": "9.8" }),
            )
            .await;
        assert_eq!(copy.status, StatusCode::CREATED);
        let copy_id = copy.json()["copy_id"].as_i64().expect("copy id");
        (issue_id, copy_id)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Encode a multipart body with the given text fields and an optional file.
pub fn multipart_request(
    uri: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &[u8])>,
) -> Request<Body> {
    const BOUNDARY: &str = "longbox-test-boundary";
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}
