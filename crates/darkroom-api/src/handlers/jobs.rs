//! Job submission, query and cancellation.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use darkroom_models::{Job, JobId, JobSpec};
use darkroom_queue::QueueError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: JobId,
    pub cancelled: bool,
}

/// POST /api/jobs
///
/// Returns 201 with the queued job, or 400 when the submission is malformed or
/// its options do not fit the job type.
pub async fn submit_job(
    State(state): State<AppState>,
    payload: Result<Json<JobSpec>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let Json(spec) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let job = state.queue.enqueue(spec)?;
    info!(job_id = %job.id, job_type = job.job_type.as_str(), "Job submitted");
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/jobs
///
/// Pending jobs in queue order, then running jobs.
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<Job>> {
    Json(state.queue.list_jobs())
}

/// GET /api/jobs/history
pub async fn job_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<Job>> {
    Json(state.history.recent(query.limit).await)
}

/// GET /api/jobs/:job_id
///
/// Live jobs come from the queue; finished ones from the history.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let id = JobId::from_string(job_id);
    if let Some(job) = state.queue.get_job(&id) {
        return Ok(Json(job));
    }
    state
        .history
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| QueueError::job_not_found(id.as_str()).into())
}

/// POST /api/jobs/:job_id/cancel
///
/// `cancelled` is false when the job already finished.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let id = JobId::from_string(job_id);
    if state.queue.cancel(&id) {
        info!(job_id = %id, "Job cancellation requested");
        return Ok(Json(CancelResponse {
            job_id: id,
            cancelled: true,
        }));
    }
    if state.history.get(&id).await.is_some() {
        return Ok(Json(CancelResponse {
            job_id: id,
            cancelled: false,
        }));
    }
    Err(QueueError::job_not_found(id.as_str()).into())
}
