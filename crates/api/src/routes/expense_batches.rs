//! Batch update and CSV import endpoints.
//!
//! Shape errors (bad JSON, wrong item count, unreadable CSV) are rejected
//! here with 400 before any job exists. Per-item failures never fail the
//! request; they show up in the item results.

use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::JsonRejection,
        State,
    },
    http::StatusCode,
    Json,
};
use domain::models::{
    check_batch_size, BatchJobCreatedResponse, BatchUpdateItem, BatchUpdateResponse,
};
use domain::services::{parse_expense_csv, run_sync_batch_update};

use crate::app::AppState;
use crate::error::ApiError;
use crate::jobs::BatchWork;
use crate::middleware::UserAuth;

/// Multipart field carrying the uploaded CSV file.
pub const CSV_FILE_FIELD: &str = "file";

/// Applies up to `max_sync_items` updates inside the request.
///
/// PUT /api/v1/expenses/batch
///
/// Responds 200 when every item succeeded and 207 Multi-Status otherwise.
pub async fn batch_update(
    State(state): State<AppState>,
    auth: UserAuth,
    payload: Result<Json<Vec<BatchUpdateItem>>, JsonRejection>,
) -> Result<(StatusCode, Json<BatchUpdateResponse>), ApiError> {
    let Json(items) = payload?;
    check_batch_size(items.len(), state.config.batch.max_sync_items)?;

    let response = run_sync_batch_update(state.expenses.as_ref(), auth.user_id, &items).await;
    let status = if response.has_failures() {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::OK
    };

    Ok((status, Json(response)))
}

/// Queues up to `max_async_items` updates as a background job.
///
/// PUT /api/v1/expenses/batch-async
pub async fn batch_update_async(
    State(state): State<AppState>,
    auth: UserAuth,
    payload: Result<Json<Vec<BatchUpdateItem>>, JsonRejection>,
) -> Result<(StatusCode, Json<BatchJobCreatedResponse>), ApiError> {
    let Json(items) = payload?;
    check_batch_size(items.len(), state.config.batch.max_async_items)?;

    let created = state
        .dispatcher
        .submit(auth.user_id, BatchWork::Update(items))
        .await?;

    tracing::info!(
        job_id = created.job_id,
        user_id = auth.user_id,
        total_items = created.total_items,
        "Accepted asynchronous batch update"
    );

    Ok((StatusCode::ACCEPTED, Json(created)))
}

/// Creates expenses from an uploaded CSV file in a background job.
///
/// POST /api/v1/expenses/batch-upload (multipart, field `file`)
pub async fn batch_upload_csv(
    State(state): State<AppState>,
    auth: UserAuth,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<BatchJobCreatedResponse>), ApiError> {
    let mut multipart = multipart?;

    let mut file = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(CSV_FILE_FIELD) {
            file = Some(field.bytes().await?);
            break;
        }
    }
    let file = file.ok_or_else(|| ApiError::Validation("CSV file is required".to_string()))?;

    let rows = parse_expense_csv(file.as_ref(), state.config.batch.max_csv_rows)?;

    let created = state
        .dispatcher
        .submit(auth.user_id, BatchWork::CsvImport(rows))
        .await?;

    tracing::info!(
        job_id = created.job_id,
        user_id = auth.user_id,
        total_items = created.total_items,
        upload_bytes = file.len(),
        "Accepted CSV import"
    );

    Ok((StatusCode::ACCEPTED, Json(created)))
}
