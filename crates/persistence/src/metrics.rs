//! Database metrics collection.

use metrics::{counter, gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

/// Record database query duration.
pub fn record_query_duration(query_name: &'static str, duration_secs: f64) {
    histogram!("database_query_duration_seconds", "query" => query_name).record(duration_secs);
}

/// Record database connection pool gauges.
///
/// Called periodically by the pool metrics job.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();
    let active = size.saturating_sub(idle);

    gauge!("database_connections_active").set(active as f64);
    gauge!("database_connections_idle").set(idle as f64);
    gauge!("database_connections_total").set(size as f64);
}

/// Times a repository query and records its duration and outcome.
///
/// ```ignore
/// let timer = QueryTimer::new("find_batch_job");
/// let result = sqlx::query_as::<_, BatchJobEntity>(...).fetch_optional(&pool).await;
/// timer.finish(result)
/// ```
pub struct QueryTimer {
    query_name: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query_name: &'static str) -> Self {
        Self {
            query_name,
            start: Instant::now(),
        }
    }

    /// Records the elapsed time, counting errors separately, and hands the
    /// result back to the caller.
    pub fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E> {
        record_query_duration(self.query_name, self.start.elapsed().as_secs_f64());
        if result.is_err() {
            counter!("database_query_errors_total", "query" => self.query_name).increment(1);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_timer_passes_result_through() {
        let timer = QueryTimer::new("test_query");
        assert_eq!(timer.query_name, "test_query");
        let ok: Result<u32, String> = timer.finish(Ok(3));
        assert_eq!(ok, Ok(3));

        let timer = QueryTimer::new("test_query");
        let err: Result<u32, String> = timer.finish(Err("boom".to_string()));
        assert_eq!(err, Err("boom".to_string()));
    }
}
