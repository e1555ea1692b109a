//! Repository implementations for database operations.

pub mod batch_job;
pub mod expense;

pub use batch_job::PgBatchJobRepository;
pub use expense::PgExpenseRepository;
