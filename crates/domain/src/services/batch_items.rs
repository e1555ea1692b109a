//! Per-item processing shared by the synchronous and asynchronous batch paths.
//!
//! Every item yields exactly one [`BatchItemResult`]. Business failures are
//! folded into the result; gateway errors are logged and replaced by a
//! generic message.

use shared::validation::error_message;

use super::gateway::ExpenseGateway;
use crate::models::{BatchItemResult, BatchUpdateItem, BatchUpdateResponse, CsvExpenseRow};

pub const MSG_EXPENSE_ID_REQUIRED: &str = "Expense ID is required";
pub const MSG_EXPENSE_NOT_FOUND: &str = "Expense not found";
pub const MSG_UPDATE_FAILED: &str = "Failed to update expense";
pub const MSG_CREATE_FAILED: &str = "Failed to create expense";
pub const MSG_UPDATED: &str = "Expense updated successfully";
pub const MSG_CREATED: &str = "Expense created successfully";
pub const MSG_NOT_PROCESSED_SHUTDOWN: &str = "Not processed: job abandoned during shutdown";
pub const MSG_NOT_PROCESSED_UNSAVED: &str = "Not processed: job progress could not be saved";
pub const MSG_NOT_PROCESSED_INTERRUPTED: &str = "Not processed: job interrupted before completion";

fn validation_failed(reason: &str) -> String {
    format!("Validation failed: {}", reason)
}

/// Applies one update instruction for `user_id`.
pub async fn apply_update_item(
    gateway: &dyn ExpenseGateway,
    user_id: i64,
    index: usize,
    item: &BatchUpdateItem,
) -> BatchItemResult {
    if item.expense_id == 0 {
        return BatchItemResult::failed(index, None, MSG_EXPENSE_ID_REQUIRED);
    }
    let expense_id = Some(item.expense_id);

    let changes = match item.to_update_request().to_changes() {
        Ok(changes) => changes,
        Err(e) => {
            return BatchItemResult::failed(index, expense_id, validation_failed(&error_message(&e)))
        }
    };

    match gateway.expense_exists(user_id, item.expense_id).await {
        Ok(true) => {}
        Ok(false) => return BatchItemResult::failed(index, expense_id, MSG_EXPENSE_NOT_FOUND),
        Err(e) => {
            tracing::error!(
                user_id = user_id,
                expense_id = item.expense_id,
                index = index,
                error = %e,
                "Failed to check expense existence"
            );
            return BatchItemResult::failed(index, expense_id, MSG_UPDATE_FAILED);
        }
    }

    match gateway
        .update_expense(user_id, item.expense_id, &changes)
        .await
    {
        Ok(Some(_)) => {
            tracing::debug!(
                user_id = user_id,
                expense_id = item.expense_id,
                index = index,
                "Batch item updated expense"
            );
            BatchItemResult::succeeded(index, item.expense_id, MSG_UPDATED)
        }
        Ok(None) => BatchItemResult::failed(index, expense_id, MSG_EXPENSE_NOT_FOUND),
        Err(e) => {
            tracing::error!(
                user_id = user_id,
                expense_id = item.expense_id,
                index = index,
                error = %e,
                "Failed to update expense"
            );
            BatchItemResult::failed(index, expense_id, MSG_UPDATE_FAILED)
        }
    }
}

/// Creates one expense from an imported CSV row for `user_id`.
pub async fn apply_create_item(
    gateway: &dyn ExpenseGateway,
    user_id: i64,
    index: usize,
    row: &CsvExpenseRow,
) -> BatchItemResult {
    let new_expense = match row.to_create_request().to_new_expense() {
        Ok(expense) => expense,
        Err(e) => {
            let reason = error_message(&e);
            tracing::debug!(index = index, reason = %reason, "CSV row failed validation");
            return BatchItemResult::failed(index, None, validation_failed(&reason));
        }
    };

    match gateway.create_expense(user_id, &new_expense).await {
        Ok(created) => {
            tracing::debug!(
                user_id = user_id,
                expense_id = created.id,
                index = index,
                "Batch item created expense"
            );
            BatchItemResult::succeeded(index, created.id, MSG_CREATED)
        }
        Err(e) => {
            tracing::error!(
                user_id = user_id,
                index = index,
                error = %e,
                "Failed to create expense"
            );
            BatchItemResult::failed(index, None, MSG_CREATE_FAILED)
        }
    }
}

/// Runs a batch of updates in request order and aggregates the outcome.
pub async fn run_sync_batch_update(
    gateway: &dyn ExpenseGateway,
    user_id: i64,
    items: &[BatchUpdateItem],
) -> BatchUpdateResponse {
    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        results.push(apply_update_item(gateway, user_id, index, item).await);
    }

    let response = BatchUpdateResponse::from_results(results);
    tracing::info!(
        user_id = user_id,
        total = response.total,
        successful = response.successful,
        failed = response.failed,
        "Synchronous batch update finished"
    );
    response
}
