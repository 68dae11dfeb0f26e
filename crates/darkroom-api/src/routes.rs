//! API routes.

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    cancel_job, create_preset, delete_preset, get_job, get_preset, health, job_history, list_jobs,
    list_presets, list_runners, queue_stats, ready, remove_runner, set_concurrency, submit_job,
    update_preset,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;
use crate::ws::ws_events;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs", post(submit_job).get(list_jobs))
        .route("/jobs/history", get(job_history))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/cancel", post(cancel_job));

    let queue_routes = Router::new()
        .route("/queue", get(queue_stats))
        .route("/queue/concurrency", put(set_concurrency))
        .route("/runners", get(list_runners))
        .route("/runners/:runner_id", delete(remove_runner));

    let preset_routes = Router::new()
        .route("/presets", get(list_presets).post(create_preset))
        .route(
            "/presets/:name",
            get(get_preset).put(update_preset).delete(delete_preset),
        );

    let api_routes = Router::new()
        .merge(job_routes)
        .merge(queue_routes)
        .merge(preset_routes);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .route("/ws/events", get(ws_events))
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
