//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod batch_job;
pub mod expense;

pub use batch_job::BatchJobEntity;
pub use expense::ExpenseEntity;
