//! Batch job polling endpoint.

use axum::{
    extract::{Path, State},
    Json,
};
use domain::models::BatchJobResponse;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::UserAuth;

fn parse_job_id(raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ApiError::Validation("Invalid job ID".to_string()))
}

fn job_not_found() -> ApiError {
    ApiError::NotFound("Job not found".to_string())
}

/// Returns the current snapshot of a job owned by the caller.
///
/// GET /api/v1/expenses/batch-async/:job_id
/// GET /api/v1/batch/jobs/:job_id
///
/// Jobs of other users are reported as not found.
pub async fn get_batch_job(
    State(state): State<AppState>,
    auth: UserAuth,
    Path(raw_job_id): Path<String>,
) -> Result<Json<BatchJobResponse>, ApiError> {
    let job_id = parse_job_id(&raw_job_id)?;

    if !state.jobs.job_exists(auth.user_id, job_id).await? {
        return Err(job_not_found());
    }

    let job = state
        .jobs
        .get_job(auth.user_id, job_id)
        .await?
        .ok_or_else(job_not_found)?;

    Ok(Json(BatchJobResponse::from(job)))
}
