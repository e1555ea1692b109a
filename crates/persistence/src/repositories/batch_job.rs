//! Batch job repository backed by PostgreSQL.

use async_trait::async_trait;
use domain::models::{BatchJob, BatchJobKind, JobProgress};
use domain::services::{BatchJobStore, GatewayError};
use sqlx::PgPool;

use crate::entities::BatchJobEntity;
use crate::metrics::QueryTimer;

/// Repository for batch job bookkeeping.
#[derive(Clone)]
pub struct PgBatchJobRepository {
    pool: PgPool,
}

impl PgBatchJobRepository {
    /// Creates a new PgBatchJobRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BatchJobStore for PgBatchJobRepository {
    async fn create_job(
        &self,
        user_id: i64,
        kind: BatchJobKind,
        total_items: i32,
    ) -> Result<i64, GatewayError> {
        let timer = QueryTimer::new("create_batch_job");
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO batch_jobs (user_id, job_type, status, total_items)
            VALUES ($1, $2, 'pending', $3)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(total_items)
        .fetch_one(&self.pool)
        .await;

        let job_id = timer.finish(result)?;
        tracing::info!(
            job_id = job_id,
            user_id = user_id,
            job_type = %kind,
            total_items = total_items,
            "Batch job created"
        );
        Ok(job_id)
    }

    async fn update_job_progress(
        &self,
        job_id: i64,
        progress: &JobProgress,
    ) -> Result<bool, GatewayError> {
        let results = serde_json::to_value(&progress.results)?;

        let timer = QueryTimer::new("update_batch_job_progress");
        let result = sqlx::query(
            r#"
            UPDATE batch_jobs
            SET status = $2,
                processed_items = $3,
                successful_items = $4,
                failed_items = $5,
                results = $6,
                note = $7,
                updated_at = NOW(),
                completed_at = CASE
                    WHEN $2 IN ('completed', 'failed') THEN NOW()
                    ELSE completed_at
                END
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(job_id)
        .bind(progress.status.as_str())
        .bind(progress.processed_items)
        .bind(progress.successful_items)
        .bind(progress.failed_items)
        .bind(results)
        .bind(progress.note.as_deref())
        .execute(&self.pool)
        .await;

        let updated = timer.finish(result)?.rows_affected() > 0;
        tracing::debug!(
            job_id = job_id,
            status = %progress.status,
            processed = progress.processed_items,
            successful = progress.successful_items,
            failed = progress.failed_items,
            updated = updated,
            "Batch job progress stored"
        );
        Ok(updated)
    }

    async fn close_interrupted_jobs(
        &self,
        stale_after_secs: u64,
        note: &str,
        item_message: &str,
    ) -> Result<u64, GatewayError> {
        let timer = QueryTimer::new("close_interrupted_batch_jobs");
        let result = sqlx::query(
            r#"
            UPDATE batch_jobs
            SET status = 'failed',
                results = COALESCE(
                    (SELECT jsonb_agg(elem ORDER BY ord)
                     FROM jsonb_array_elements(results) WITH ORDINALITY AS r(elem, ord)
                     WHERE ord <= processed_items),
                    '[]'::jsonb
                ) || COALESCE(
                    (SELECT jsonb_agg(
                                jsonb_build_object('index', i, 'message', $3, 'success', false)
                                ORDER BY i)
                     FROM generate_series(processed_items, total_items - 1) AS i),
                    '[]'::jsonb
                ),
                processed_items = total_items,
                failed_items = total_items - successful_items,
                note = $2,
                updated_at = NOW(),
                completed_at = NOW()
            WHERE status IN ('pending', 'processing')
              AND updated_at <= NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(stale_after_secs as f64)
        .bind(note)
        .bind(item_message)
        .execute(&self.pool)
        .await;

        Ok(timer.finish(result)?.rows_affected())
    }

    async fn get_job(&self, user_id: i64, job_id: i64) -> Result<Option<BatchJob>, GatewayError> {
        let timer = QueryTimer::new("get_batch_job");
        let result = sqlx::query_as::<_, BatchJobEntity>(
            r#"
            SELECT id, user_id, job_type, status, total_items, processed_items,
                   successful_items, failed_items, results, note,
                   created_at, updated_at, completed_at
            FROM batch_jobs
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(job_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;

        timer.finish(result)?.map(BatchJob::try_from).transpose()
    }

    async fn job_exists(&self, user_id: i64, job_id: i64) -> Result<bool, GatewayError> {
        let timer = QueryTimer::new("batch_job_exists");
        let result = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM batch_jobs WHERE id = $1 AND user_id = $2)",
        )
        .bind(job_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await;

        Ok(timer.finish(result)?)
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        Ok(crate::db::ping(&self.pool).await?)
    }
}
