//! Bounded pool for asynchronous batch jobs.
//!
//! Each accepted job gets its own task. A semaphore caps how many run at
//! once; the rest wait in `pending`. Shutdown cancels a shared token, which
//! every running or queued job observes before its next item.

use std::sync::Arc;
use std::time::Duration;

use domain::models::{BatchJobCreatedResponse, BatchJobStatus};
use domain::services::{BatchJobStore, ExpenseGateway, GatewayError};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::batch_executor::{BatchExecutor, BatchRequest, BatchWork, RetryPolicy};
use super::throttle::ItemThrottle;
use crate::config::BatchConfig;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Server is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Store(#[from] GatewayError),
}

#[derive(Clone)]
pub struct BatchDispatcher {
    executor: BatchExecutor,
    jobs: Arc<dyn BatchJobStore>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl BatchDispatcher {
    pub fn new(executor: BatchExecutor, jobs: Arc<dyn BatchJobStore>, concurrency: usize) -> Self {
        Self {
            executor,
            jobs,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn from_config(
        expenses: Arc<dyn ExpenseGateway>,
        jobs: Arc<dyn BatchJobStore>,
        config: &BatchConfig,
    ) -> Self {
        let throttle = ItemThrottle::new(config.item_delay(), config.items_per_second);
        let retry = RetryPolicy {
            max_retries: config.persist_max_retries,
            initial_backoff: Duration::from_millis(config.persist_backoff_ms),
            max_backoff: Duration::from_millis(config.persist_max_backoff_ms),
        };
        let executor = BatchExecutor::new(expenses, Arc::clone(&jobs), throttle, retry);
        Self::new(executor, jobs, config.worker_concurrency)
    }

    /// Creates a `pending` job for `work` and schedules it.
    ///
    /// Returns as soon as the job record exists; processing happens in the
    /// background.
    pub async fn submit(
        &self,
        user_id: i64,
        work: BatchWork,
    ) -> Result<BatchJobCreatedResponse, DispatchError> {
        if self.is_shutting_down() {
            return Err(DispatchError::ShuttingDown);
        }

        let total_items = work.len() as i32;
        let job_id = self
            .jobs
            .create_job(user_id, work.kind(), total_items)
            .await?;

        self.spawn(BatchRequest {
            job_id,
            user_id,
            work,
        });

        Ok(BatchJobCreatedResponse {
            job_id,
            total_items,
            status: BatchJobStatus::Pending,
        })
    }

    fn spawn(&self, request: BatchRequest) {
        let executor = self.executor.clone();
        let permits = Arc::clone(&self.permits);
        let shutdown = self.shutdown.clone();

        self.tracker.spawn(async move {
            // A cancelled wait leaves no permit; the executor then abandons
            // the job without touching any item.
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                permit = permits.acquire_owned() => permit.ok(),
            };

            let outcome = executor.run(&request, &shutdown).await;
            drop(permit);

            debug!(
                job_id = request.job_id,
                user_id = request.user_id,
                outcome = ?outcome,
                "Batch job task exited"
            );
        });
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of job tasks that have not exited yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Worker slots currently free.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stops accepting jobs, signals running ones to abandon, and waits up
    /// to `timeout` for their tasks to exit. Returns false on timeout.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        info!(in_flight = self.in_flight(), "Shutting down batch dispatcher");
        self.shutdown.cancel();
        self.tracker.close();

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!("All batch jobs stopped");
                true
            }
            Err(_) => {
                warn!(
                    in_flight = self.in_flight(),
                    "Batch job shutdown timed out after {:?}", timeout
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{BatchJob, BatchUpdateItem, NOTE_ABANDONED_ON_SHUTDOWN};
    use domain::services::InMemoryStore;

    const OWNER: i64 = 3;

    fn dispatcher(store: &Arc<InMemoryStore>, delay_ms: u64, concurrency: usize) -> BatchDispatcher {
        let executor = BatchExecutor::new(
            store.clone(),
            store.clone(),
            ItemThrottle::new(Duration::from_millis(delay_ms), 0),
            RetryPolicy::default(),
        );
        BatchDispatcher::new(executor, store.clone(), concurrency)
    }

    fn updates(store: &InMemoryStore, count: usize) -> BatchWork {
        BatchWork::Update(
            (0..count)
                .map(|i| BatchUpdateItem {
                    expense_id: store.seed_expense(OWNER, "Item", 1.0),
                    amount: Some(10.0 + i as f64),
                    ..Default::default()
                })
                .collect(),
        )
    }

    async fn wait_for_terminal(store: &InMemoryStore, job_id: i64) -> BatchJob {
        for _ in 0..200 {
            if let Some(job) = store.job(job_id).filter(|j| j.status.is_terminal()) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", job_id);
    }

    #[tokio::test]
    async fn test_submit_returns_pending_envelope_and_runs_job() {
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = dispatcher(&store, 0, 2);

        let created = dispatcher.submit(OWNER, updates(&store, 2)).await.unwrap();

        assert_eq!(created.total_items, 2);
        assert_eq!(created.status, BatchJobStatus::Pending);

        let job = wait_for_terminal(&store, created.job_id).await;
        assert_eq!(job.status, BatchJobStatus::Completed);
        assert_eq!(job.successful_items, 2);
        assert_eq!(job.user_id, OWNER);
    }

    #[tokio::test]
    async fn test_jobs_beyond_concurrency_stay_pending() {
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = dispatcher(&store, 50, 1);

        let first = dispatcher.submit(OWNER, updates(&store, 3)).await.unwrap();
        let second = dispatcher.submit(OWNER, updates(&store, 1)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(dispatcher.available_permits(), 0);
        assert_eq!(dispatcher.in_flight(), 2);
        assert_eq!(
            store.job(second.job_id).unwrap().status,
            BatchJobStatus::Pending
        );

        assert_eq!(
            wait_for_terminal(&store, first.job_id).await.status,
            BatchJobStatus::Completed
        );
        assert_eq!(
            wait_for_terminal(&store, second.job_id).await.status,
            BatchJobStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_shutdown_abandons_running_and_queued_jobs() {
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = dispatcher(&store, 200, 1);

        let running = dispatcher.submit(OWNER, updates(&store, 3)).await.unwrap();
        let queued = dispatcher.submit(OWNER, updates(&store, 2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(dispatcher.shutdown(Duration::from_secs(5)).await);
        assert_eq!(dispatcher.in_flight(), 0);

        for job_id in [running.job_id, queued.job_id] {
            let job = store.job(job_id).unwrap();
            assert!(job.status.is_terminal());
            assert_eq!(job.processed_items, job.total_items);
            assert_eq!(
                job.processed_items,
                job.successful_items + job.failed_items
            );
            assert_eq!(job.note.as_deref(), Some(NOTE_ABANDONED_ON_SHUTDOWN));
        }

        // The queued job never reached `processing`.
        assert!(store
            .progress_history(queued.job_id)
            .iter()
            .all(|p| p.status != BatchJobStatus::Processing));
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = dispatcher(&store, 0, 1);
        dispatcher.shutdown(Duration::from_secs(1)).await;

        let result = dispatcher.submit(OWNER, updates(&store, 1)).await;

        assert!(matches!(result, Err(DispatchError::ShuttingDown)));
        assert!(dispatcher.is_shutting_down());
    }

    #[tokio::test]
    async fn test_store_failure_on_submit_is_reported() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_job_creation(true);
        let dispatcher = dispatcher(&store, 0, 1);

        let result = dispatcher.submit(OWNER, updates(&store, 1)).await;

        assert!(matches!(result, Err(DispatchError::Store(_))));
        assert_eq!(dispatcher.in_flight(), 0);
    }
}
