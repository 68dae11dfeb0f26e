//! Queue control and runner registry handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use darkroom_queue::{QueueError, QueueStats, RunnerInfo};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SetConcurrencyRequest {
    #[validate(range(min = 1, max = 256))]
    pub concurrency: usize,
}

/// GET /api/queue
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.queue.stats())
}

/// PUT /api/queue/concurrency
pub async fn set_concurrency(
    State(state): State<AppState>,
    Json(request): Json<SetConcurrencyRequest>,
) -> ApiResult<Json<QueueStats>> {
    request.validate()?;
    state.queue.set_concurrency(request.concurrency);
    info!(concurrency = request.concurrency, "Concurrency updated");
    Ok(Json(state.queue.stats()))
}

/// GET /api/runners
pub async fn list_runners(State(state): State<AppState>) -> Json<Vec<RunnerInfo>> {
    Json(state.queue.runners())
}

/// DELETE /api/runners/:runner_id
///
/// Jobs already running on the runner are left to finish.
pub async fn remove_runner(
    State(state): State<AppState>,
    Path(runner_id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.queue.remove_runner(&runner_id).await {
        info!(runner_id = %runner_id, "Runner removed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(QueueError::runner_not_found(runner_id).into())
    }
}
