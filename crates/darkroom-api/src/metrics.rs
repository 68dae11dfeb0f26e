//! Prometheus metrics for the API server and the queue it hosts.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use darkroom_models::QueueEvent;
use darkroom_queue::ProcessingQueue;

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "darkroom_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "darkroom_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "darkroom_http_requests_in_flight";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "darkroom_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "darkroom_ws_connections_active";
    pub const WS_MESSAGES_SENT: &str = "darkroom_ws_messages_sent_total";

    // Queue metrics
    pub const QUEUE_PENDING: &str = "darkroom_queue_pending";
    pub const QUEUE_ACTIVE: &str = "darkroom_queue_active";
    pub const RUNNERS_REGISTERED: &str = "darkroom_runners_registered";
    pub const JOBS_ENQUEUED_TOTAL: &str = "darkroom_jobs_enqueued_total";
    pub const JOBS_STARTED_TOTAL: &str = "darkroom_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "darkroom_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "darkroom_jobs_failed_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "darkroom_jobs_cancelled_total";
    pub const JOB_DURATION_SECONDS: &str = "darkroom_job_duration_seconds";
    pub const EVENTS_LAGGED_TOTAL: &str = "darkroom_events_lagged_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record WebSocket connection.
pub fn record_ws_connection(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::WS_CONNECTIONS_TOTAL, &labels).increment(1);
}

/// Update active WebSocket connections gauge.
pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

/// Record WebSocket message sent.
pub fn record_ws_message_sent(endpoint: &str, message_type: &str) {
    let labels = [
        ("endpoint", endpoint.to_string()),
        ("type", message_type.to_string()),
    ];
    counter!(names::WS_MESSAGES_SENT, &labels).increment(1);
}

/// Update counters for one queue event.
pub fn record_queue_event(event: &QueueEvent) {
    match event {
        QueueEvent::JobQueued { job } => {
            let labels = [("type", job.job_type.as_str().to_string())];
            counter!(names::JOBS_ENQUEUED_TOTAL, &labels).increment(1);
        }
        QueueEvent::JobStarted { job, runner_id, .. } => {
            let labels = [
                ("type", job.job_type.as_str().to_string()),
                ("runner", runner_id.clone()),
            ];
            counter!(names::JOBS_STARTED_TOTAL, &labels).increment(1);
        }
        QueueEvent::JobCompleted { job, .. } => {
            let labels = [("type", job.job_type.as_str().to_string())];
            counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
            if let (Some(started), Some(finished)) = (job.started_at, job.finished_at) {
                let secs = (finished - started).num_milliseconds().max(0) as f64 / 1000.0;
                histogram!(names::JOB_DURATION_SECONDS, &labels).record(secs);
            }
        }
        QueueEvent::JobFailed { job, .. } => {
            let labels = [("type", job.job_type.as_str().to_string())];
            counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
        }
        QueueEvent::JobCancelled { job, reason } => {
            let labels = [
                ("type", job.job_type.as_str().to_string()),
                ("reason", reason.clone().unwrap_or_else(|| "unknown".to_string())),
            ];
            counter!(names::JOBS_CANCELLED_TOTAL, &labels).increment(1);
        }
        QueueEvent::JobProgress { .. }
        | QueueEvent::RunnerAdded { .. }
        | QueueEvent::RunnerRemoved { .. } => {}
    }
}

/// Refresh the queue gauges from a stats snapshot.
pub fn set_queue_gauges(queue: &ProcessingQueue) {
    let stats = queue.stats();
    gauge!(names::QUEUE_PENDING).set(stats.pending as f64);
    gauge!(names::QUEUE_ACTIVE).set(stats.active as f64);
    gauge!(names::RUNNERS_REGISTERED).set(stats.runners as f64);
}

/// Keep queue metrics current from the event stream.
pub fn spawn_queue_metrics(queue: ProcessingQueue) -> JoinHandle<()> {
    let mut events = queue.subscribe();
    tokio::spawn(async move {
        set_queue_gauges(&queue);
        loop {
            match events.recv().await {
                Ok(event) => {
                    record_queue_event(&event);
                    if !matches!(event, QueueEvent::JobProgress { .. }) {
                        set_queue_gauges(&queue);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    counter!(names::EVENTS_LAGGED_TOTAL).increment(skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Collapse identifiers in a path so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let mut out = Vec::new();
    let mut previous = "";
    for segment in path.split('/') {
        let replaced = match previous {
            "jobs" if segment != "history" => ":job_id",
            "presets" => ":name",
            "runners" => ":runner_id",
            _ => segment,
        };
        out.push(if segment.is_empty() { segment } else { replaced });
        previous = segment;
    }
    out.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/jobs/job-550e8400-e29b-41d4-a716-446655440000/cancel"),
            "/api/jobs/:job_id/cancel"
        );
        assert_eq!(sanitize_path("/api/jobs/history"), "/api/jobs/history");
        assert_eq!(sanitize_path("/api/jobs"), "/api/jobs");
        assert_eq!(sanitize_path("/api/presets/warm%20film"), "/api/presets/:name");
        assert_eq!(sanitize_path("/api/runners/inference"), "/api/runners/:runner_id");
    }
}
