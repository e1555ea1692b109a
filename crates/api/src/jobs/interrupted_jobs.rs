//! Closes batch jobs a previous run left non-terminal.
//!
//! Jobs are not resumed after a restart. This runs once at startup, before
//! the dispatcher accepts work, so it never touches a job this process owns.

use std::sync::Arc;

use domain::models::{BatchJobStatus, NOTE_INTERRUPTED};
use domain::services::batch_items::MSG_NOT_PROCESSED_INTERRUPTED;
use domain::services::{BatchJobStore, GatewayError};
use tracing::{info, warn};

use crate::middleware::metrics::record_batch_jobs_closed;

/// Marks every `pending` or `processing` job not updated for
/// `stale_after_secs` as `failed`. Returns the number of jobs closed.
pub async fn close_interrupted_jobs(
    jobs: &Arc<dyn BatchJobStore>,
    stale_after_secs: u64,
) -> Result<u64, GatewayError> {
    let closed = jobs
        .close_interrupted_jobs(stale_after_secs, NOTE_INTERRUPTED, MSG_NOT_PROCESSED_INTERRUPTED)
        .await?;

    if closed > 0 {
        warn!(
            closed = closed,
            stale_after_secs = stale_after_secs,
            "Closed batch jobs interrupted by a previous run"
        );
        record_batch_jobs_closed(BatchJobStatus::Failed, closed);
    } else {
        info!("No interrupted batch jobs found");
    }

    Ok(closed)
}
