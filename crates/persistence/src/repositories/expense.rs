//! Expense repository backed by PostgreSQL.

use async_trait::async_trait;
use domain::models::{Expense, ExpenseChanges, NewExpense};
use domain::services::{ExpenseGateway, GatewayError};
use sqlx::PgPool;

use crate::entities::ExpenseEntity;
use crate::metrics::QueryTimer;

const EXPENSE_COLUMNS: &str =
    "id, user_id, title, amount, category_id, date, notes, image_url, created_at, updated_at";

/// Repository for single-item expense operations.
#[derive(Clone)]
pub struct PgExpenseRepository {
    pool: PgPool,
}

impl PgExpenseRepository {
    /// Creates a new PgExpenseRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExpenseGateway for PgExpenseRepository {
    async fn expense_exists(&self, user_id: i64, expense_id: i64) -> Result<bool, GatewayError> {
        let timer = QueryTimer::new("expense_exists");
        let result = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM expenses
                WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            )
            "#,
        )
        .bind(expense_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await;

        Ok(timer.finish(result)?)
    }

    async fn update_expense(
        &self,
        user_id: i64,
        expense_id: i64,
        changes: &ExpenseChanges,
    ) -> Result<Option<Expense>, GatewayError> {
        let timer = QueryTimer::new("update_expense");
        let sql = format!(
            r#"
            UPDATE expenses
            SET title = COALESCE($3, title),
                amount = COALESCE($4, amount),
                category_id = COALESCE($5, category_id),
                date = COALESCE($6, date),
                notes = COALESCE($7, notes),
                image_url = COALESCE($8, image_url),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            RETURNING {}
            "#,
            EXPENSE_COLUMNS
        );
        let result = sqlx::query_as::<_, ExpenseEntity>(&sql)
            .bind(expense_id)
            .bind(user_id)
            .bind(changes.title.as_deref())
            .bind(changes.amount)
            .bind(changes.category_id)
            .bind(changes.date)
            .bind(changes.notes.as_deref())
            .bind(changes.image_url.as_deref())
            .fetch_optional(&self.pool)
            .await;

        Ok(timer.finish(result)?.map(Expense::from))
    }

    async fn create_expense(
        &self,
        user_id: i64,
        expense: &NewExpense,
    ) -> Result<Expense, GatewayError> {
        let timer = QueryTimer::new("create_expense");
        let sql = format!(
            r#"
            INSERT INTO expenses (user_id, title, amount, category_id, date, notes, image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            EXPENSE_COLUMNS
        );
        let result = sqlx::query_as::<_, ExpenseEntity>(&sql)
            .bind(user_id)
            .bind(&expense.title)
            .bind(expense.amount)
            .bind(expense.category_id)
            .bind(expense.date)
            .bind(expense.notes.as_deref())
            .bind(expense.image_url.as_deref())
            .fetch_one(&self.pool)
            .await;

        Ok(timer.finish(result)?.into())
    }
}
