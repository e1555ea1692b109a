//! Batch job models.
//!
//! A batch job tracks the asynchronous processing of a multi-item request.
//! Jobs move `pending -> processing -> completed | failed` and are never
//! deleted.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::batch::BatchItemResult;

/// Note recorded when a job is stopped by an orderly shutdown.
pub const NOTE_ABANDONED_ON_SHUTDOWN: &str = "Job abandoned during shutdown";

/// Note recorded when progress could not be persisted after retries.
pub const NOTE_PROGRESS_NOT_SAVED: &str = "Job progress could not be saved";

/// Note recorded on jobs closed at startup after an interrupted run.
pub const NOTE_INTERRUPTED: &str = "Job interrupted before completion";

/// Kind of work a batch job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchJobKind {
    ExpenseBatchUpdate,
    ExpenseBatchUploadCsv,
}

impl BatchJobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchJobKind::ExpenseBatchUpdate => "expense_batch_update",
            BatchJobKind::ExpenseBatchUploadCsv => "expense_batch_upload_csv",
        }
    }
}

impl std::fmt::Display for BatchJobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BatchJobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expense_batch_update" => Ok(BatchJobKind::ExpenseBatchUpdate),
            "expense_batch_upload_csv" => Ok(BatchJobKind::ExpenseBatchUploadCsv),
            _ => Err(format!("Unknown batch job kind: {}", s)),
        }
    }
}

/// Lifecycle status of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BatchJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchJobStatus::Pending => "pending",
            BatchJobStatus::Processing => "processing",
            BatchJobStatus::Completed => "completed",
            BatchJobStatus::Failed => "failed",
        }
    }

    /// Terminal jobs accept no further progress updates.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchJobStatus::Completed | BatchJobStatus::Failed)
    }

    /// Terminal status for a finished job: `failed` only when there was at
    /// least one item and every item failed.
    pub fn terminal_for(total: i32, failed: i32) -> Self {
        if total > 0 && failed >= total {
            BatchJobStatus::Failed
        } else {
            BatchJobStatus::Completed
        }
    }
}

impl std::fmt::Display for BatchJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BatchJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BatchJobStatus::Pending),
            "processing" => Ok(BatchJobStatus::Processing),
            "completed" => Ok(BatchJobStatus::Completed),
            "failed" => Ok(BatchJobStatus::Failed),
            _ => Err(format!("Unknown batch job status: {}", s)),
        }
    }
}

/// Full progress snapshot written with every bookkeeping update.
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub status: BatchJobStatus,
    pub processed_items: i32,
    pub successful_items: i32,
    pub failed_items: i32,
    pub results: Vec<BatchItemResult>,
    pub note: Option<String>,
}

impl JobProgress {
    /// The zero-progress snapshot that moves a job into `processing`.
    pub fn started() -> Self {
        Self {
            status: BatchJobStatus::Processing,
            processed_items: 0,
            successful_items: 0,
            failed_items: 0,
            results: Vec::new(),
            note: None,
        }
    }

    /// Builds a snapshot from the results recorded so far.
    pub fn from_results(status: BatchJobStatus, results: &[BatchItemResult]) -> Self {
        let successful = results.iter().filter(|r| r.success).count() as i32;
        let processed = results.len() as i32;
        Self {
            status,
            processed_items: processed,
            successful_items: successful,
            failed_items: processed - successful,
            results: results.to_vec(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// A batch job as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: i64,
    pub user_id: i64,
    pub kind: BatchJobKind,
    pub status: BatchJobStatus,
    pub total_items: i32,
    pub processed_items: i32,
    pub successful_items: i32,
    pub failed_items: i32,
    pub results: Vec<BatchItemResult>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchJob {
    /// Share of processed items, 0-100. Jobs without items report 100.
    pub fn progress_percent(&self) -> u8 {
        if self.total_items <= 0 {
            return 100;
        }
        let processed = self.processed_items.clamp(0, self.total_items) as i64;
        ((processed * 100) / self.total_items as i64) as u8
    }
}

/// Job status response returned by the polling endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJobResponse {
    pub job_id: i64,
    pub user_id: i64,
    pub job_type: BatchJobKind,
    pub status: BatchJobStatus,
    pub total_items: i32,
    pub processed_items: i32,
    pub successful_items: i32,
    pub failed_items: i32,
    pub progress_percent: u8,
    pub results: Vec<BatchItemResult>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<BatchJob> for BatchJobResponse {
    fn from(job: BatchJob) -> Self {
        let progress_percent = job.progress_percent();
        Self {
            job_id: job.id,
            user_id: job.user_id,
            job_type: job.kind,
            status: job.status,
            total_items: job.total_items,
            processed_items: job.processed_items,
            successful_items: job.successful_items,
            failed_items: job.failed_items,
            progress_percent,
            results: job.results,
            note: job.note,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(total: i32, processed: i32) -> BatchJob {
        let now = Utc::now();
        BatchJob {
            id: 1,
            user_id: 7,
            kind: BatchJobKind::ExpenseBatchUpdate,
            status: BatchJobStatus::Processing,
            total_items: total,
            processed_items: processed,
            successful_items: processed,
            failed_items: 0,
            results: Vec::new(),
            note: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!(
            BatchJobStatus::from_str("pending").unwrap(),
            BatchJobStatus::Pending
        );
        assert_eq!(
            BatchJobStatus::from_str("COMPLETED").unwrap(),
            BatchJobStatus::Completed
        );
        assert!(BatchJobStatus::from_str("cancelled").is_err());
    }

    #[test]
    fn test_status_display_and_terminal() {
        assert_eq!(BatchJobStatus::Processing.to_string(), "processing");
        assert!(!BatchJobStatus::Pending.is_terminal());
        assert!(!BatchJobStatus::Processing.is_terminal());
        assert!(BatchJobStatus::Completed.is_terminal());
        assert!(BatchJobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_terminal_threshold() {
        assert_eq!(BatchJobStatus::terminal_for(0, 0), BatchJobStatus::Completed);
        assert_eq!(BatchJobStatus::terminal_for(3, 2), BatchJobStatus::Completed);
        assert_eq!(BatchJobStatus::terminal_for(3, 3), BatchJobStatus::Failed);
        assert_eq!(BatchJobStatus::terminal_for(1, 1), BatchJobStatus::Failed);
    }

    #[test]
    fn test_kind_round_trip_names() {
        assert_eq!(
            BatchJobKind::ExpenseBatchUploadCsv.to_string(),
            "expense_batch_upload_csv"
        );
        assert_eq!(
            BatchJobKind::from_str("expense_batch_update").unwrap(),
            BatchJobKind::ExpenseBatchUpdate
        );
        assert!(BatchJobKind::from_str("unknown").is_err());
    }

    #[test]
    fn test_progress_from_results() {
        let results = vec![
            BatchItemResult::succeeded(0, 1, "Expense updated successfully"),
            BatchItemResult::failed(1, Some(2), "Expense not found"),
        ];
        let progress = JobProgress::from_results(BatchJobStatus::Processing, &results);
        assert_eq!(progress.processed_items, 2);
        assert_eq!(progress.successful_items, 1);
        assert_eq!(progress.failed_items, 1);
        assert!(progress.note.is_none());

        let started = JobProgress::started();
        assert_eq!(started.status, BatchJobStatus::Processing);
        assert_eq!(started.processed_items, 0);
        assert!(started.results.is_empty());
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(job(0, 0).progress_percent(), 100);
        assert_eq!(job(4, 0).progress_percent(), 0);
        assert_eq!(job(4, 1).progress_percent(), 25);
        assert_eq!(job(3, 2).progress_percent(), 66);
        assert_eq!(job(3, 3).progress_percent(), 100);
    }

    #[test]
    fn test_response_serialization() {
        let response = BatchJobResponse::from(job(10, 5));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["jobId"], 1);
        assert_eq!(json["jobType"], "expense_batch_update");
        assert_eq!(json["status"], "processing");
        assert_eq!(json["progressPercent"], 50);
        assert!(json["completedAt"].is_null());
        assert!(json["results"].as_array().unwrap().is_empty());
    }
}
