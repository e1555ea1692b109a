//! In-memory implementation of the storage gateways.
//!
//! Used by tests and local tooling. Supports failure injection so callers
//! can exercise error paths without a database.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};

use super::gateway::{BatchJobStore, ExpenseGateway, GatewayError};
use crate::models::{
    BatchItemResult, BatchJob, BatchJobKind, BatchJobStatus, Expense, ExpenseChanges,
    JobProgress, NewExpense,
};

#[derive(Debug, Default)]
struct State {
    next_expense_id: i64,
    next_job_id: i64,
    expenses: HashMap<i64, Expense>,
    jobs: HashMap<i64, BatchJob>,
    progress_log: HashMap<i64, Vec<JobProgress>>,
    failing_expense_ids: HashSet<i64>,
    fail_creates: bool,
    fail_progress_writes: usize,
    fail_job_creation: bool,
}

/// Thread-safe in-memory store for expenses and batch jobs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts an expense for `user_id` and returns its ID.
    pub fn seed_expense(&self, user_id: i64, title: &str, amount: f64) -> i64 {
        let mut state = self.state();
        state.next_expense_id += 1;
        let id = state.next_expense_id;
        let now = Utc::now();
        state.expenses.insert(
            id,
            Expense {
                id,
                user_id,
                title: title.to_string(),
                amount,
                category_id: None,
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
                notes: None,
                image_url: None,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn expense(&self, id: i64) -> Option<Expense> {
        self.state().expenses.get(&id).cloned()
    }

    pub fn expense_count(&self) -> usize {
        self.state().expenses.len()
    }

    /// Makes updates of `expense_id` fail with a gateway error.
    pub fn fail_writes_for_expense(&self, expense_id: i64) {
        self.state().failing_expense_ids.insert(expense_id);
    }

    /// Makes every expense creation fail with a gateway error.
    pub fn fail_creates(&self, fail: bool) {
        self.state().fail_creates = fail;
    }

    /// Makes job creation fail with a gateway error.
    pub fn fail_job_creation(&self, fail: bool) {
        self.state().fail_job_creation = fail;
    }

    /// Makes the next `count` progress writes fail.
    pub fn fail_next_progress_writes(&self, count: usize) {
        self.state().fail_progress_writes = count;
    }

    /// Returns a job regardless of owner.
    pub fn job(&self, job_id: i64) -> Option<BatchJob> {
        self.state().jobs.get(&job_id).cloned()
    }

    /// Returns every progress snapshot accepted for a job, in write order.
    pub fn progress_history(&self, job_id: i64) -> Vec<JobProgress> {
        self.state()
            .progress_log
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExpenseGateway for InMemoryStore {
    async fn expense_exists(&self, user_id: i64, expense_id: i64) -> Result<bool, GatewayError> {
        Ok(self
            .state()
            .expenses
            .get(&expense_id)
            .is_some_and(|e| e.user_id == user_id))
    }

    async fn update_expense(
        &self,
        user_id: i64,
        expense_id: i64,
        changes: &ExpenseChanges,
    ) -> Result<Option<Expense>, GatewayError> {
        let mut state = self.state();
        if state.failing_expense_ids.contains(&expense_id) {
            return Err(GatewayError::Unavailable("injected update failure".into()));
        }

        let Some(expense) = state
            .expenses
            .get_mut(&expense_id)
            .filter(|e| e.user_id == user_id)
        else {
            return Ok(None);
        };

        if let Some(title) = &changes.title {
            expense.title = title.clone();
        }
        if let Some(amount) = changes.amount {
            expense.amount = amount;
        }
        if let Some(category_id) = changes.category_id {
            expense.category_id = Some(category_id);
        }
        if let Some(date) = changes.date {
            expense.date = date;
        }
        if let Some(notes) = &changes.notes {
            expense.notes = Some(notes.clone());
        }
        if let Some(image_url) = &changes.image_url {
            expense.image_url = Some(image_url.clone());
        }
        expense.updated_at = Utc::now();

        Ok(Some(expense.clone()))
    }

    async fn create_expense(
        &self,
        user_id: i64,
        expense: &NewExpense,
    ) -> Result<Expense, GatewayError> {
        let mut state = self.state();
        if state.fail_creates {
            return Err(GatewayError::Unavailable("injected create failure".into()));
        }

        state.next_expense_id += 1;
        let now = Utc::now();
        let created = Expense {
            id: state.next_expense_id,
            user_id,
            title: expense.title.clone(),
            amount: expense.amount,
            category_id: expense.category_id,
            date: expense.date,
            notes: expense.notes.clone(),
            image_url: expense.image_url.clone(),
            created_at: now,
            updated_at: now,
        };
        state.expenses.insert(created.id, created.clone());
        Ok(created)
    }
}

#[async_trait]
impl BatchJobStore for InMemoryStore {
    async fn create_job(
        &self,
        user_id: i64,
        kind: BatchJobKind,
        total_items: i32,
    ) -> Result<i64, GatewayError> {
        let mut state = self.state();
        if state.fail_job_creation {
            return Err(GatewayError::Unavailable("injected job creation failure".into()));
        }

        state.next_job_id += 1;
        let id = state.next_job_id;
        let now = Utc::now();
        state.jobs.insert(
            id,
            BatchJob {
                id,
                user_id,
                kind,
                status: BatchJobStatus::Pending,
                total_items,
                processed_items: 0,
                successful_items: 0,
                failed_items: 0,
                results: Vec::new(),
                note: None,
                created_at: now,
                updated_at: now,
                completed_at: None,
            },
        );
        Ok(id)
    }

    async fn update_job_progress(
        &self,
        job_id: i64,
        progress: &JobProgress,
    ) -> Result<bool, GatewayError> {
        let mut state = self.state();
        if state.fail_progress_writes > 0 {
            state.fail_progress_writes -= 1;
            return Err(GatewayError::Unavailable("injected progress failure".into()));
        }

        let Some(job) = state.jobs.get_mut(&job_id) else {
            return Ok(false);
        };
        if job.status.is_terminal() {
            return Ok(false);
        }

        let now = Utc::now();
        job.status = progress.status;
        job.processed_items = progress.processed_items;
        job.successful_items = progress.successful_items;
        job.failed_items = progress.failed_items;
        job.results = progress.results.clone();
        job.note = progress.note.clone();
        job.updated_at = now;
        if progress.status.is_terminal() {
            job.completed_at = Some(now);
        }

        state
            .progress_log
            .entry(job_id)
            .or_default()
            .push(progress.clone());
        Ok(true)
    }

    async fn get_job(&self, user_id: i64, job_id: i64) -> Result<Option<BatchJob>, GatewayError> {
        Ok(self
            .state()
            .jobs
            .get(&job_id)
            .filter(|j| j.user_id == user_id)
            .cloned())
    }

    async fn job_exists(&self, user_id: i64, job_id: i64) -> Result<bool, GatewayError> {
        Ok(self
            .state()
            .jobs
            .get(&job_id)
            .is_some_and(|j| j.user_id == user_id))
    }

    async fn close_interrupted_jobs(
        &self,
        stale_after_secs: u64,
        note: &str,
        item_message: &str,
    ) -> Result<u64, GatewayError> {
        let now = Utc::now();
        let cutoff = now - Duration::seconds(stale_after_secs.min(u64::from(u32::MAX)) as i64);
        let mut closed = 0;

        for job in self.state().jobs.values_mut() {
            if job.status.is_terminal() || job.updated_at > cutoff {
                continue;
            }
            let first_unprocessed = job.processed_items.max(0) as usize;
            let total = job.total_items.max(0) as usize;
            job.results.truncate(first_unprocessed);
            job.results.extend(
                (first_unprocessed..total).map(|i| BatchItemResult::failed(i, None, item_message)),
            );
            job.status = BatchJobStatus::Failed;
            job.processed_items = job.total_items;
            job.failed_items = job.total_items - job.successful_items;
            job.note = Some(note.to_string());
            job.updated_at = now;
            job.completed_at = Some(now);
            closed += 1;
        }

        Ok(closed)
    }
}
