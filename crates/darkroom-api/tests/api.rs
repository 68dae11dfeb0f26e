//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use darkroom_api::{create_router, ApiConfig, AppState};
use darkroom_queue::{ProcessingQueue, QueueConfig};
use darkroom_storage::PresetManager;
use darkroom_worker::{register_default_runners, WorkerConfig};

const WAIT: Duration = Duration::from_secs(5);

/// Router over a fresh queue and a preset store inside `dir`.
fn test_app(dir: &TempDir, with_runners: bool) -> Router {
    let queue = ProcessingQueue::new(QueueConfig::default());
    if with_runners {
        register_default_runners(&queue, &WorkerConfig::fast(dir.path()));
    }
    let presets = PresetManager::new(dir.path().join("presets.json"));
    let state = AppState::new(ApiConfig::default(), queue, presets);
    create_router(state, None)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Poll a job until it reports `status`.
async fn wait_for_status(app: &Router, job_id: &str, status: &str) -> Value {
    let uri = format!("/api/jobs/{}", job_id);
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let (code, job) = send(app, Method::GET, &uri, None).await;
        if code == StatusCode::OK && job["status"] == status {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} never reached {}; last: {}",
            job_id,
            status,
            job
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir, false);

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_ready_requires_runners() {
    let dir = TempDir::new().unwrap();

    let (status, body) = send(&test_app(&dir, false), Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");

    let (status, body) = send(&test_app(&dir, true), Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue"]["runners"], 2);
}

/// A submitted job runs to completion and stays queryable from history.
#[tokio::test]
async fn test_submit_job_completes() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir, true);

    let (status, job) = send(
        &app,
        Method::POST,
        "/api/jobs",
        Some(json!({"type": "super_res", "options": {"kind": "super_res", "scale_factor": 4}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["type"], "super_res");
    let id = job["id"].as_str().expect("id").to_string();
    assert!(id.starts_with("job-"));

    let done = wait_for_status(&app, &id, "completed").await;
    assert_eq!(done["progress"], 100);
    assert_eq!(done["result"]["scale_factor"], 4);
    assert!(done["output_path"].as_str().is_some());

    let (_, history) = send(&app, Method::GET, "/api/jobs/history", None).await;
    assert_eq!(history[0]["id"], id.as_str());
}

#[tokio::test]
async fn test_submit_job_rejects_bad_specs() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir, true);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/jobs",
        Some(json!({"type": "inpaint", "options": {"kind": "export", "format": "png"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().is_some());

    let (status, _) = send(&app, Method::POST, "/api/jobs", Some(json!({"type": "teleport"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::POST, "/api/jobs", Some(json!({"input_path": "/a.png"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Custom parameters are an open map, even when they use a `kind` key.
#[tokio::test]
async fn test_custom_params_keep_their_own_kind() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir, false);

    let (status, job) = send(
        &app,
        Method::POST,
        "/api/jobs",
        Some(json!({"type": "custom", "options": {"kind": "sharpen", "amount": 2}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["options"], json!({"kind": "sharpen", "amount": 2}));
}

/// With no runner for its type, a job waits in the queue until cancelled.
#[tokio::test]
async fn test_cancel_queued_job() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir, true);

    let (_, job) = send(&app, Method::POST, "/api/jobs", Some(json!({"type": "custom"}))).await;
    let id = job["id"].as_str().expect("id").to_string();

    let (status, jobs) = send(&app, Method::GET, "/api/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jobs[0]["status"], "queued");

    let uri = format!("/api/jobs/{}/cancel", id);
    let (status, body) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], true);

    let cancelled = wait_for_status(&app, &id, "cancelled").await;
    assert_eq!(cancelled["progress"], 0);

    let (status, body) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], false);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir, false);

    let (status, body) = send(&app, Method::GET, "/api/jobs/job-missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("job-missing"));

    let (status, _) = send(&app, Method::POST, "/api/jobs/job-missing/cancel", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_queue_concurrency() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir, false);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/queue/concurrency",
        Some(json!({"concurrency": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, stats) = send(
        &app,
        Method::PUT,
        "/api/queue/concurrency",
        Some(json!({"concurrency": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["concurrency"], 3);

    let (_, stats) = send(&app, Method::GET, "/api/queue", None).await;
    assert_eq!(stats["concurrency"], 3);
    assert_eq!(stats["pending"], 0);
}

#[tokio::test]
async fn test_runner_registry() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir, true);

    let (status, runners) = send(&app, Method::GET, "/api/runners", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(runners[0]["id"], "inference");
    assert_eq!(runners[1]["id"], "pipeline");

    let (status, _) = send(&app, Method::DELETE, "/api/runners/pipeline", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::DELETE, "/api/runners/pipeline", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, runners) = send(&app, Method::GET, "/api/runners", None).await;
    assert_eq!(runners.as_array().unwrap().len(), 1);
}

/// Create, read, filter, overwrite and delete a preset over HTTP.
#[tokio::test]
async fn test_preset_crud() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir, false);

    let (status, created) = send(
        &app,
        Method::POST,
        "/api/presets",
        Some(json!({
            "name": "warm film",
            "operations": [{"operation": "exposure", "params": {"ev": 0.3}}],
            "meta": {"category": "film"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "warm film");

    let (status, fetched) = send(&app, Method::GET, "/api/presets/warm%20film", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["operations"][0]["operation"], "exposure");

    let (_, film) = send(&app, Method::GET, "/api/presets?category=film", None).await;
    assert_eq!(film.as_array().unwrap().len(), 1);
    let (_, other) = send(&app, Method::GET, "/api/presets?category=portrait", None).await;
    assert!(other.as_array().unwrap().is_empty());

    let (status, updated) = send(
        &app,
        Method::PUT,
        "/api/presets/warm%20film",
        Some(json!({"operations": [{"operation": "grain"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["created_at"], created["created_at"]);
    assert_ne!(updated["updated_at"], created["updated_at"]);

    let (status, _) = send(&app, Method::DELETE, "/api/presets/warm%20film", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::DELETE, "/api/presets/warm%20film", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::GET, "/api/presets/warm%20film", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_preset_name_validation() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir, false);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/presets",
        Some(json!({"name": "", "operations": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().is_some());

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/presets/%20%20",
        Some(json!({"operations": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir, false);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("X-Request-ID", "req-123")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.headers()["x-request-id"], "req-123");

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert!(response.headers().contains_key("x-request-id"));
}
