//! Drives one batch job from `pending` to a terminal status.
//!
//! Items run strictly in input order. After each item the full result list
//! is stored as a progress snapshot, so a failed write only ever needs the
//! latest snapshot retried. The executor never returns an error: every
//! outcome ends up in the job record or, if the store is unreachable, in
//! the logs.

use std::sync::Arc;
use std::time::Duration;

use domain::models::{
    BatchItemResult, BatchJobKind, BatchJobStatus, BatchUpdateItem, CsvExpenseRow, JobProgress,
    NOTE_ABANDONED_ON_SHUTDOWN, NOTE_PROGRESS_NOT_SAVED,
};
use domain::services::batch_items::{MSG_NOT_PROCESSED_SHUTDOWN, MSG_NOT_PROCESSED_UNSAVED};
use domain::services::{apply_create_item, apply_update_item, BatchJobStore, ExpenseGateway};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::throttle::ItemThrottle;
use crate::middleware::metrics::{
    record_batch_item_processed, record_batch_job_finished, record_batch_job_started,
};

/// Items of one job.
#[derive(Debug, Clone)]
pub enum BatchWork {
    Update(Vec<BatchUpdateItem>),
    CsvImport(Vec<CsvExpenseRow>),
}

impl BatchWork {
    pub fn kind(&self) -> BatchJobKind {
        match self {
            BatchWork::Update(_) => BatchJobKind::ExpenseBatchUpdate,
            BatchWork::CsvImport(_) => BatchJobKind::ExpenseBatchUploadCsv,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BatchWork::Update(items) => items.len(),
            BatchWork::CsvImport(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn apply(
        &self,
        gateway: &dyn ExpenseGateway,
        user_id: i64,
        index: usize,
    ) -> BatchItemResult {
        match self {
            BatchWork::Update(items) => {
                apply_update_item(gateway, user_id, index, &items[index]).await
            }
            BatchWork::CsvImport(rows) => {
                apply_create_item(gateway, user_id, index, &rows[index]).await
            }
        }
    }

    /// Identifier echoed for an item that was never attempted.
    fn echoed_id(&self, index: usize) -> Option<i64> {
        match self {
            BatchWork::Update(items) => Some(items[index].expense_id).filter(|id| *id != 0),
            BatchWork::CsvImport(_) => None,
        }
    }
}

/// A job that has been created in the store and is waiting to run.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub job_id: i64,
    pub user_id: i64,
    pub work: BatchWork,
}

/// Bounded exponential backoff for progress writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// How a job run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every item was processed and the terminal snapshot stored.
    Finished(BatchJobStatus),
    /// Shutdown stopped the job; unprocessed items were recorded as failed.
    Abandoned(BatchJobStatus),
    /// Progress writes kept failing; the job was closed as failed if possible.
    ProgressLost,
    /// The store refused the update because the job is gone or already terminal.
    ClosedExternally,
}

enum Persisted {
    Stored,
    Closed,
    Exhausted,
}

#[derive(Clone)]
pub struct BatchExecutor {
    expenses: Arc<dyn ExpenseGateway>,
    jobs: Arc<dyn BatchJobStore>,
    throttle: ItemThrottle,
    retry: RetryPolicy,
}

impl BatchExecutor {
    pub fn new(
        expenses: Arc<dyn ExpenseGateway>,
        jobs: Arc<dyn BatchJobStore>,
        throttle: ItemThrottle,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            expenses,
            jobs,
            throttle,
            retry,
        }
    }

    /// Runs a job to completion or until `cancel` fires.
    pub async fn run(&self, request: &BatchRequest, cancel: &CancellationToken) -> JobOutcome {
        let (job_id, user_id, work) = (request.job_id, request.user_id, &request.work);
        let total = work.len();

        if cancel.is_cancelled() {
            return self.abandon(request, Vec::new()).await;
        }

        match self.persist(job_id, &JobProgress::started()).await {
            Persisted::Stored => {}
            Persisted::Closed => return JobOutcome::ClosedExternally,
            Persisted::Exhausted => return self.give_up(request, Vec::new()).await,
        }

        record_batch_job_started(work.kind());
        info!(
            job_id = job_id,
            user_id = user_id,
            job_type = %work.kind(),
            total_items = total,
            "Batch job processing started"
        );

        let mut results = Vec::with_capacity(total);
        for index in 0..total {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.abandon(request, results).await,
                _ = self.throttle.wait() => {}
            }

            let result = work.apply(self.expenses.as_ref(), user_id, index).await;
            record_batch_item_processed(result.success);
            results.push(result);

            let snapshot = JobProgress::from_results(BatchJobStatus::Processing, &results);
            match self.persist(job_id, &snapshot).await {
                Persisted::Stored => {}
                Persisted::Closed => return JobOutcome::ClosedExternally,
                Persisted::Exhausted => return self.give_up(request, results).await,
            }
        }

        let failed = results.iter().filter(|r| !r.success).count() as i32;
        let status = BatchJobStatus::terminal_for(total as i32, failed);
        match self
            .persist(job_id, &JobProgress::from_results(status, &results))
            .await
        {
            Persisted::Stored => {
                record_batch_job_finished(status);
                info!(
                    job_id = job_id,
                    user_id = user_id,
                    status = %status,
                    total_items = total,
                    failed_items = failed,
                    "Batch job finished"
                );
                JobOutcome::Finished(status)
            }
            Persisted::Closed => JobOutcome::ClosedExternally,
            Persisted::Exhausted => self.give_up(request, results).await,
        }
    }

    /// Closes a job stopped by shutdown. Unprocessed items are recorded as
    /// failed and the usual terminal threshold applies.
    async fn abandon(&self, request: &BatchRequest, results: Vec<BatchItemResult>) -> JobOutcome {
        let processed = results.len();
        let results = fill_remaining(&request.work, results, MSG_NOT_PROCESSED_SHUTDOWN);
        let failed = results.iter().filter(|r| !r.success).count() as i32;
        let status = BatchJobStatus::terminal_for(results.len() as i32, failed);

        warn!(
            job_id = request.job_id,
            user_id = request.user_id,
            processed_items = processed,
            total_items = results.len(),
            status = %status,
            "Abandoning batch job during shutdown"
        );

        let progress =
            JobProgress::from_results(status, &results).with_note(NOTE_ABANDONED_ON_SHUTDOWN);
        match self.persist(request.job_id, &progress).await {
            Persisted::Stored => {
                record_batch_job_finished(status);
                JobOutcome::Abandoned(status)
            }
            Persisted::Closed => JobOutcome::ClosedExternally,
            Persisted::Exhausted => JobOutcome::ProgressLost,
        }
    }

    /// Closes a job whose progress could not be stored. The job always ends
    /// `failed`, whatever the item outcomes were.
    async fn give_up(&self, request: &BatchRequest, results: Vec<BatchItemResult>) -> JobOutcome {
        let results = fill_remaining(&request.work, results, MSG_NOT_PROCESSED_UNSAVED);
        let progress = JobProgress::from_results(BatchJobStatus::Failed, &results)
            .with_note(NOTE_PROGRESS_NOT_SAVED);

        match self.persist(request.job_id, &progress).await {
            Persisted::Stored => record_batch_job_finished(BatchJobStatus::Failed),
            Persisted::Closed => return JobOutcome::ClosedExternally,
            Persisted::Exhausted => {
                error!(
                    job_id = request.job_id,
                    user_id = request.user_id,
                    "Batch job left unfinished; it is closed at the next startup"
                );
            }
        }
        JobOutcome::ProgressLost
    }

    async fn persist(&self, job_id: i64, progress: &JobProgress) -> Persisted {
        let mut attempt = 0;
        loop {
            match self.jobs.update_job_progress(job_id, progress).await {
                Ok(true) => return Persisted::Stored,
                Ok(false) => {
                    warn!(
                        job_id = job_id,
                        status = %progress.status,
                        "Batch job is missing or already terminal; stopping"
                    );
                    return Persisted::Closed;
                }
                Err(e) if attempt >= self.retry.max_retries => {
                    error!(
                        job_id = job_id,
                        attempts = attempt + 1,
                        error = %e,
                        "Giving up on batch job progress update"
                    );
                    return Persisted::Exhausted;
                }
                Err(e) => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        job_id = job_id,
                        attempt = attempt + 1,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Batch job progress update failed, retrying"
                    );
                    metrics::counter!("batch_job_progress_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn fill_remaining(
    work: &BatchWork,
    mut results: Vec<BatchItemResult>,
    message: &str,
) -> Vec<BatchItemResult> {
    for index in results.len()..work.len() {
        results.push(BatchItemResult::failed(index, work.echoed_id(index), message));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain::models::{Expense, ExpenseChanges, NewExpense};
    use domain::services::batch_items::{MSG_CREATED, MSG_EXPENSE_NOT_FOUND, MSG_UPDATED};
    use domain::services::{GatewayError, InMemoryStore};

    const OWNER: i64 = 1;

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    fn executor(store: &Arc<InMemoryStore>, retries: u32) -> BatchExecutor {
        BatchExecutor::new(
            store.clone(),
            store.clone(),
            ItemThrottle::none(),
            fast_retry(retries),
        )
    }

    fn update(expense_id: i64, amount: f64) -> BatchUpdateItem {
        BatchUpdateItem {
            expense_id,
            amount: Some(amount),
            ..Default::default()
        }
    }

    fn row(title: &str) -> CsvExpenseRow {
        CsvExpenseRow {
            title: title.to_string(),
            amount: 4.25,
            category_id: None,
            date: "2024-03-01".to_string(),
            notes: None,
        }
    }

    async fn submit(store: &InMemoryStore, work: BatchWork) -> BatchRequest {
        let job_id = store
            .create_job(OWNER, work.kind(), work.len() as i32)
            .await
            .unwrap();
        BatchRequest {
            job_id,
            user_id: OWNER,
            work,
        }
    }

    fn assert_history_consistent(store: &InMemoryStore, job_id: i64) {
        let history = store.progress_history(job_id);
        assert!(!history.is_empty());
        assert_eq!(history[0], JobProgress::started());

        let mut last_processed = 0;
        for snapshot in &history {
            assert_eq!(
                snapshot.processed_items,
                snapshot.successful_items + snapshot.failed_items
            );
            assert!(snapshot.processed_items >= last_processed);
            last_processed = snapshot.processed_items;
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_update_job_completes_with_partial_failure() {
        let store = Arc::new(InMemoryStore::new());
        let first = store.seed_expense(OWNER, "Rent", 900.0);
        let third = store.seed_expense(OWNER, "Gym", 40.0);
        let request = submit(
            &store,
            BatchWork::Update(vec![update(first, 910.0), update(777, 1.0), update(third, 45.0)]),
        )
        .await;

        let outcome = executor(&store, 0).run(&request, &CancellationToken::new()).await;

        assert_eq!(outcome, JobOutcome::Finished(BatchJobStatus::Completed));
        let job = store.job(request.job_id).unwrap();
        assert_eq!(job.status, BatchJobStatus::Completed);
        assert_eq!(job.processed_items, 3);
        assert_eq!(job.successful_items, 2);
        assert_eq!(job.failed_items, 1);
        assert!(job.completed_at.is_some());
        assert!(job.note.is_none());
        assert_eq!(job.results[0].message, MSG_UPDATED);
        assert_eq!(job.results[1].message, MSG_EXPENSE_NOT_FOUND);
        let indices: Vec<usize> = job.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(store.expense(third).unwrap().amount, 45.0);

        assert_history_consistent(&store, request.job_id);
        // started + one per item + terminal
        assert_eq!(store.progress_history(request.job_id).len(), 5);
    }

    #[tokio::test]
    async fn test_job_fails_only_when_every_item_fails() {
        let store = Arc::new(InMemoryStore::new());
        let request = submit(
            &store,
            BatchWork::Update(vec![update(500, 1.0), update(0, 1.0)]),
        )
        .await;

        let outcome = executor(&store, 0).run(&request, &CancellationToken::new()).await;

        assert_eq!(outcome, JobOutcome::Finished(BatchJobStatus::Failed));
        let job = store.job(request.job_id).unwrap();
        assert_eq!(job.failed_items, 2);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_empty_job_completes() {
        let store = Arc::new(InMemoryStore::new());
        let request = submit(&store, BatchWork::Update(Vec::new())).await;

        let outcome = executor(&store, 0).run(&request, &CancellationToken::new()).await;

        assert_eq!(outcome, JobOutcome::Finished(BatchJobStatus::Completed));
        assert_eq!(store.job(request.job_id).unwrap().progress_percent(), 100);
    }

    #[tokio::test]
    async fn test_csv_job_creates_expenses() {
        let store = Arc::new(InMemoryStore::new());
        let request = submit(
            &store,
            BatchWork::CsvImport(vec![row("Coffee"), row(""), row("Lunch")]),
        )
        .await;

        let outcome = executor(&store, 0).run(&request, &CancellationToken::new()).await;

        assert_eq!(outcome, JobOutcome::Finished(BatchJobStatus::Completed));
        let job = store.job(request.job_id).unwrap();
        assert_eq!(job.kind, BatchJobKind::ExpenseBatchUploadCsv);
        assert_eq!(job.successful_items, 2);
        assert_eq!(job.results[0].message, MSG_CREATED);
        assert_eq!(job.results[1].message, "Validation failed: title is required");
        assert_eq!(store.expense_count(), 2);

        let created = store.expense(job.results[2].expense_id.unwrap()).unwrap();
        assert_eq!(created.title, "Lunch");
        assert_eq!(created.user_id, OWNER);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_abandons_every_item() {
        let store = Arc::new(InMemoryStore::new());
        let id = store.seed_expense(OWNER, "Rent", 900.0);
        let request = submit(&store, BatchWork::Update(vec![update(id, 1.0), update(id, 2.0)])).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = executor(&store, 0).run(&request, &cancel).await;

        assert_eq!(outcome, JobOutcome::Abandoned(BatchJobStatus::Failed));
        let job = store.job(request.job_id).unwrap();
        assert_eq!(job.status, BatchJobStatus::Failed);
        assert_eq!(job.processed_items, 2);
        assert_eq!(job.note.as_deref(), Some(NOTE_ABANDONED_ON_SHUTDOWN));
        assert!(job
            .results
            .iter()
            .all(|r| r.message == MSG_NOT_PROCESSED_SHUTDOWN && r.expense_id == Some(id)));
        assert_eq!(store.expense(id).unwrap().amount, 900.0);
    }

    /// Cancels the token while a given expense is being updated.
    struct CancelDuringUpdate {
        inner: Arc<InMemoryStore>,
        trigger: i64,
        token: CancellationToken,
    }

    #[async_trait]
    impl ExpenseGateway for CancelDuringUpdate {
        async fn expense_exists(&self, user_id: i64, expense_id: i64) -> Result<bool, GatewayError> {
            self.inner.expense_exists(user_id, expense_id).await
        }

        async fn update_expense(
            &self,
            user_id: i64,
            expense_id: i64,
            changes: &ExpenseChanges,
        ) -> Result<Option<Expense>, GatewayError> {
            if expense_id == self.trigger {
                self.token.cancel();
            }
            self.inner.update_expense(user_id, expense_id, changes).await
        }

        async fn create_expense(
            &self,
            user_id: i64,
            expense: &NewExpense,
        ) -> Result<Expense, GatewayError> {
            self.inner.create_expense(user_id, expense).await
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_job_stops_before_next_item() {
        let store = Arc::new(InMemoryStore::new());
        let a = store.seed_expense(OWNER, "A", 1.0);
        let b = store.seed_expense(OWNER, "B", 2.0);
        let c = store.seed_expense(OWNER, "C", 3.0);
        let request = submit(
            &store,
            BatchWork::Update(vec![update(a, 10.0), update(b, 20.0), update(c, 30.0)]),
        )
        .await;

        let cancel = CancellationToken::new();
        let gateway = Arc::new(CancelDuringUpdate {
            inner: store.clone(),
            trigger: b,
            token: cancel.clone(),
        });
        let executor = BatchExecutor::new(gateway, store.clone(), ItemThrottle::none(), fast_retry(0));

        let outcome = executor.run(&request, &cancel).await;

        assert_eq!(outcome, JobOutcome::Abandoned(BatchJobStatus::Completed));
        let job = store.job(request.job_id).unwrap();
        assert_eq!(job.processed_items, 3);
        assert_eq!(job.successful_items, 2);
        assert_eq!(job.failed_items, 1);
        assert_eq!(job.results[2].message, MSG_NOT_PROCESSED_SHUTDOWN);
        assert_eq!(job.note.as_deref(), Some(NOTE_ABANDONED_ON_SHUTDOWN));
        assert_eq!(store.expense(b).unwrap().amount, 20.0);
        assert_eq!(store.expense(c).unwrap().amount, 3.0);
        assert_history_consistent(&store, request.job_id);
    }

    #[tokio::test]
    async fn test_transient_progress_failures_are_retried() {
        let store = Arc::new(InMemoryStore::new());
        let id = store.seed_expense(OWNER, "Rent", 900.0);
        let request = submit(&store, BatchWork::Update(vec![update(id, 950.0)])).await;
        store.fail_next_progress_writes(2);

        let outcome = executor(&store, 3).run(&request, &CancellationToken::new()).await;

        assert_eq!(outcome, JobOutcome::Finished(BatchJobStatus::Completed));
        assert_history_consistent(&store, request.job_id);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_the_job_with_note() {
        let store = Arc::new(InMemoryStore::new());
        let id = store.seed_expense(OWNER, "Rent", 900.0);
        let request = submit(&store, BatchWork::Update(vec![update(id, 950.0), update(id, 960.0)])).await;
        // The initial write and both retries fail; the closing write succeeds.
        store.fail_next_progress_writes(3);

        let outcome = executor(&store, 2).run(&request, &CancellationToken::new()).await;

        assert_eq!(outcome, JobOutcome::ProgressLost);
        let job = store.job(request.job_id).unwrap();
        assert_eq!(job.status, BatchJobStatus::Failed);
        assert_eq!(job.processed_items, 2);
        assert_eq!(job.failed_items, 2);
        assert_eq!(job.note.as_deref(), Some(NOTE_PROGRESS_NOT_SAVED));
        assert!(job
            .results
            .iter()
            .all(|r| r.message == MSG_NOT_PROCESSED_UNSAVED));
        assert_eq!(store.expense(id).unwrap().amount, 900.0);
    }

    #[tokio::test]
    async fn test_job_closed_elsewhere_stops_processing() {
        let store = Arc::new(InMemoryStore::new());
        let id = store.seed_expense(OWNER, "Rent", 900.0);
        let request = submit(&store, BatchWork::Update(vec![update(id, 950.0)])).await;
        store
            .update_job_progress(
                request.job_id,
                &JobProgress::from_results(BatchJobStatus::Failed, &[]),
            )
            .await
            .unwrap();

        let outcome = executor(&store, 0).run(&request, &CancellationToken::new()).await;

        assert_eq!(outcome, JobOutcome::ClosedExternally);
        assert_eq!(store.expense(id).unwrap().amount, 900.0);
    }
}
