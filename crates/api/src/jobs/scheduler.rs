//! Periodic maintenance jobs.
//!
//! Each registered [`Job`] gets its own task on a shared [`TaskTracker`].
//! Runs of one job never overlap: a run that outlasts its period makes the
//! next tick wait instead of piling up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::counter;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFrequency {
    Seconds(u64),
    Minutes(u64),
}

impl JobFrequency {
    /// Period between runs, never shorter than one second.
    pub fn period(&self) -> Duration {
        let secs = match self {
            JobFrequency::Seconds(secs) => *secs,
            JobFrequency::Minutes(mins) => mins.saturating_mul(60),
        };
        Duration::from_secs(secs.max(1))
    }
}

#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// Stable name used in logs and the `scheduled_job_runs_total` label.
    fn name(&self) -> &'static str;

    fn frequency(&self) -> JobFrequency;

    /// Whether the first run happens right away instead of one period
    /// after start.
    fn run_at_startup(&self) -> bool {
        false
    }

    async fn execute(&self) -> Result<(), String>;
}

pub struct JobScheduler {
    jobs: Vec<Arc<dyn Job>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn register<J: Job + 'static>(&mut self, job: J) {
        self.jobs.push(Arc::new(job));
    }

    pub fn start(&self) {
        info!(jobs = self.jobs.len(), "Starting maintenance job scheduler");

        for job in &self.jobs {
            let job = Arc::clone(job);
            let cancel = self.shutdown.child_token();
            self.tracker.spawn(run_job_loop(job, cancel));
        }
        self.tracker.close();
    }

    /// Stops every job loop and waits up to `timeout` for in-progress runs.
    /// Returns false on timeout.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        info!("Stopping maintenance job scheduler");
        self.shutdown.cancel();
        self.tracker.close();

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!("All maintenance jobs stopped");
                true
            }
            Err(_) => {
                warn!("Maintenance job shutdown timed out after {:?}", timeout);
                false
            }
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_job_loop(job: Arc<dyn Job>, cancel: CancellationToken) {
    let name = job.name();
    let period = job.frequency().period();
    let first_run = if job.run_at_startup() {
        tokio::time::Instant::now()
    } else {
        tokio::time::Instant::now() + period
    };

    let mut interval = tokio::time::interval_at(first_run, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(job = name, period_secs = period.as_secs(), "Job scheduled");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => run_once(job.as_ref()).await,
        }
    }

    debug!(job = name, "Job loop exited");
}

async fn run_once(job: &dyn Job) {
    let name = job.name();
    let start = Instant::now();
    let result = job.execute().await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    let outcome = match &result {
        Ok(()) => {
            debug!(job = name, elapsed_ms, "Job run finished");
            "success"
        }
        Err(e) => {
            error!(job = name, elapsed_ms, error = %e, "Job run failed");
            "failure"
        }
    };
    counter!("scheduled_job_runs_total", "job" => name, "outcome" => outcome).increment(1);
}
