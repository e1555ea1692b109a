//! Batch update and CSV import request/result models.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::batch_job::BatchJobStatus;
use super::expense::{CreateExpenseRequest, UpdateExpenseRequest};

/// Maximum items accepted by the synchronous batch update.
pub const MAX_SYNC_BATCH_ITEMS: usize = 100;

/// Maximum items accepted by the asynchronous batch update.
pub const MAX_ASYNC_BATCH_ITEMS: usize = 100;

/// Maximum data rows accepted from a CSV upload.
pub const MAX_CSV_IMPORT_ROWS: usize = 1000;

/// Rejection of a batch before any item is processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchRequestError {
    #[error("No updates provided")]
    Empty,

    #[error("Batch size too large. Maximum {max} updates allowed")]
    TooLarge { max: usize },
}

/// Checks the number of update items against the configured cap.
pub fn check_batch_size(len: usize, max: usize) -> Result<(), BatchRequestError> {
    if len == 0 {
        return Err(BatchRequestError::Empty);
    }
    if len > max {
        return Err(BatchRequestError::TooLarge { max });
    }
    Ok(())
}

/// One update instruction in a batch.
///
/// A missing `expenseId` deserializes to 0 and is reported per item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateItem {
    #[serde(default)]
    pub expense_id: i64,
    pub title: Option<String>,
    pub amount: Option<f64>,
    pub category_id: Option<i64>,
    pub date: Option<String>,
    pub notes: Option<String>,
}

impl BatchUpdateItem {
    pub fn to_update_request(&self) -> UpdateExpenseRequest {
        UpdateExpenseRequest {
            title: self.title.clone(),
            amount: self.amount,
            category_id: self.category_id,
            date: self.date.clone(),
            notes: self.notes.clone(),
            image_url: None,
        }
    }
}

/// One data row of an uploaded CSV file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvExpenseRow {
    pub title: String,
    pub amount: f64,
    pub category_id: Option<i64>,
    pub date: String,
    pub notes: Option<String>,
}

impl CsvExpenseRow {
    pub fn to_create_request(&self) -> CreateExpenseRequest {
        CreateExpenseRequest {
            title: self.title.clone(),
            amount: self.amount,
            category_id: self.category_id,
            date: self.date.clone(),
            notes: self.notes.clone(),
            image_url: None,
        }
    }
}

/// Outcome of a single batch item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    /// Zero-based position of the item in the submitted list.
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expense_id: Option<i64>,
    pub message: String,
    pub success: bool,
}

impl BatchItemResult {
    pub fn succeeded(index: usize, expense_id: i64, message: impl Into<String>) -> Self {
        Self {
            index,
            expense_id: Some(expense_id),
            message: message.into(),
            success: true,
        }
    }

    pub fn failed(index: usize, expense_id: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            index,
            expense_id,
            message: message.into(),
            success: false,
        }
    }
}

/// Aggregated response of the synchronous batch update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateResponse {
    pub results: Vec<BatchItemResult>,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl BatchUpdateResponse {
    pub fn from_results(results: Vec<BatchItemResult>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        let total = results.len();
        Self {
            results,
            total,
            successful,
            failed: total - successful,
        }
    }

    /// True when at least one item failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Envelope returned when an asynchronous job is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJobCreatedResponse {
    pub job_id: i64,
    pub total_items: i32,
    pub status: BatchJobStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_batch_size() {
        assert_eq!(check_batch_size(0, 100), Err(BatchRequestError::Empty));
        assert!(check_batch_size(1, 100).is_ok());
        assert!(check_batch_size(100, 100).is_ok());
        assert_eq!(
            check_batch_size(101, 100),
            Err(BatchRequestError::TooLarge { max: 100 })
        );
    }

    #[test]
    fn test_batch_request_error_messages() {
        assert_eq!(BatchRequestError::Empty.to_string(), "No updates provided");
        assert_eq!(
            BatchRequestError::TooLarge { max: 100 }.to_string(),
            "Batch size too large. Maximum 100 updates allowed"
        );
    }

    #[test]
    fn test_batch_update_item_missing_id_defaults_to_zero() {
        let item: BatchUpdateItem = serde_json::from_str(r#"{"title":"Rent"}"#).unwrap();
        assert_eq!(item.expense_id, 0);
        assert_eq!(item.title.as_deref(), Some("Rent"));
    }

    #[test]
    fn test_batch_update_item_to_request() {
        let item = BatchUpdateItem {
            expense_id: 9,
            amount: Some(12.0),
            notes: Some("split".into()),
            ..Default::default()
        };
        let request = item.to_update_request();
        assert_eq!(request.amount, Some(12.0));
        assert_eq!(request.notes.as_deref(), Some("split"));
        assert!(request.image_url.is_none());
    }

    #[test]
    fn test_result_serialization_omits_missing_expense_id() {
        let failed = BatchItemResult::failed(2, None, "Validation failed: title is required");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["index"], 2);
        assert_eq!(json["success"], false);
        assert!(json.get("expenseId").is_none());

        let ok = BatchItemResult::succeeded(0, 15, "Expense updated successfully");
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["expenseId"], 15);
    }

    #[test]
    fn test_batch_update_response_counts() {
        let response = BatchUpdateResponse::from_results(vec![
            BatchItemResult::succeeded(0, 1, "Expense updated successfully"),
            BatchItemResult::failed(1, Some(2), "Expense not found"),
            BatchItemResult::succeeded(2, 3, "Expense updated successfully"),
        ]);
        assert_eq!(response.total, 3);
        assert_eq!(response.successful, 2);
        assert_eq!(response.failed, 1);
        assert!(response.has_failures());
    }

    #[test]
    fn test_job_created_response_serialization() {
        let response = BatchJobCreatedResponse {
            job_id: 12,
            total_items: 3,
            status: BatchJobStatus::Pending,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["jobId"], 12);
        assert_eq!(json["totalItems"], 3);
        assert_eq!(json["status"], "pending");
    }
}
