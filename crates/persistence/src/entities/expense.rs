//! Expense entity (database row mapping).

use chrono::{DateTime, NaiveDate, Utc};
use domain::models::Expense;
use sqlx::FromRow;

/// Database row mapping for the expenses table.
#[derive(Debug, Clone, FromRow)]
pub struct ExpenseEntity {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub amount: f64,
    pub category_id: Option<i64>,
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ExpenseEntity> for Expense {
    fn from(entity: ExpenseEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            title: entity.title,
            amount: entity.amount,
            category_id: entity.category_id,
            date: entity.date,
            notes: entity.notes,
            image_url: entity.image_url,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
