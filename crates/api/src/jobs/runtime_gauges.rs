//! Publishes connection pool and batch worker gauges.

use sqlx::PgPool;

use super::batch_dispatcher::BatchDispatcher;
use super::scheduler::{Job, JobFrequency};
use crate::middleware::metrics::record_batch_workers;

pub struct RuntimeGaugesJob {
    pool: PgPool,
    dispatcher: BatchDispatcher,
}

impl RuntimeGaugesJob {
    pub fn new(pool: PgPool, dispatcher: BatchDispatcher) -> Self {
        Self { pool, dispatcher }
    }
}

#[async_trait::async_trait]
impl Job for RuntimeGaugesJob {
    fn name(&self) -> &'static str {
        "runtime_gauges"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(10)
    }

    fn run_at_startup(&self) -> bool {
        true
    }

    async fn execute(&self) -> Result<(), String> {
        persistence::metrics::record_pool_metrics(&self.pool);
        record_batch_workers(
            self.dispatcher.in_flight(),
            self.dispatcher.available_permits(),
        );
        Ok(())
    }
}
