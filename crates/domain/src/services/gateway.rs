//! Storage seams for expenses and batch job bookkeeping.
//!
//! The batch executor and HTTP handlers only talk to these traits. The
//! persistence crate implements them over PostgreSQL; [`InMemoryStore`]
//! implements them for tests and local tooling.
//!
//! [`InMemoryStore`]: super::in_memory::InMemoryStore

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{BatchJob, BatchJobKind, Expense, ExpenseChanges, JobProgress, NewExpense};

/// Errors raised by a storage gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Single-item expense operations, always scoped to the owning user.
#[async_trait]
pub trait ExpenseGateway: Send + Sync {
    /// Returns true when the expense exists, is owned by `user_id` and is not deleted.
    async fn expense_exists(&self, user_id: i64, expense_id: i64) -> Result<bool, GatewayError>;

    /// Applies `changes` and returns the updated record, or `None` when no
    /// owned expense matched.
    async fn update_expense(
        &self,
        user_id: i64,
        expense_id: i64,
        changes: &ExpenseChanges,
    ) -> Result<Option<Expense>, GatewayError>;

    async fn create_expense(
        &self,
        user_id: i64,
        expense: &NewExpense,
    ) -> Result<Expense, GatewayError>;
}

/// Durable batch job bookkeeping.
#[async_trait]
pub trait BatchJobStore: Send + Sync {
    /// Creates a `pending` job and returns its generated ID.
    async fn create_job(
        &self,
        user_id: i64,
        kind: BatchJobKind,
        total_items: i32,
    ) -> Result<i64, GatewayError>;

    /// Stores a full progress snapshot.
    ///
    /// Returns `false` when the job does not exist or is already terminal.
    /// Entering a terminal status sets `completed_at`.
    async fn update_job_progress(
        &self,
        job_id: i64,
        progress: &JobProgress,
    ) -> Result<bool, GatewayError>;

    /// Fetches a job owned by `user_id`.
    async fn get_job(&self, user_id: i64, job_id: i64) -> Result<Option<BatchJob>, GatewayError>;

    /// Cheap ownership-scoped existence probe.
    async fn job_exists(&self, user_id: i64, job_id: i64) -> Result<bool, GatewayError>;

    /// Closes every non-terminal job not updated for `stale_after_secs`.
    ///
    /// Unprocessed items are recorded as failed with `item_message`, so a
    /// closed job still carries one result per item and
    /// `processed == total`. Returns the number of jobs closed.
    async fn close_interrupted_jobs(
        &self,
        stale_after_secs: u64,
        note: &str,
        item_message: &str,
    ) -> Result<u64, GatewayError>;

    /// Readiness probe for the backing store.
    async fn ping(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}
