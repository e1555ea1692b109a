//! Batch job entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{BatchItemResult, BatchJob};
use domain::services::GatewayError;
use sqlx::FromRow;

/// Database row mapping for the batch_jobs table.
#[derive(Debug, Clone, FromRow)]
pub struct BatchJobEntity {
    pub id: i64,
    pub user_id: i64,
    pub job_type: String,
    pub status: String,
    pub total_items: i32,
    pub processed_items: i32,
    pub successful_items: i32,
    pub failed_items: i32,
    /// Ordered per-item results; NULL until the first item finishes.
    pub results: Option<serde_json::Value>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<BatchJobEntity> for BatchJob {
    type Error = GatewayError;

    fn try_from(entity: BatchJobEntity) -> Result<Self, Self::Error> {
        let kind = entity.job_type.parse().map_err(GatewayError::Corrupt)?;
        let status = entity.status.parse().map_err(GatewayError::Corrupt)?;
        let results: Vec<BatchItemResult> = match entity.results {
            Some(value) if !value.is_null() => serde_json::from_value(value)?,
            _ => Vec::new(),
        };

        Ok(Self {
            id: entity.id,
            user_id: entity.user_id,
            kind,
            status,
            total_items: entity.total_items,
            processed_items: entity.processed_items,
            successful_items: entity.successful_items,
            failed_items: entity.failed_items,
            results,
            note: entity.note,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
            completed_at: entity.completed_at,
        })
    }
}
