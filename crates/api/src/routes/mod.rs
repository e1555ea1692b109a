//! HTTP route handlers.

pub mod batch_jobs;
pub mod expense_batches;
pub mod health;
