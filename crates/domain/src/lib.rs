//! Domain layer for the expense tracker backend.
//!
//! This crate contains:
//! - Domain models (Expense, BatchJob, batch items)
//! - Batch item processing and CSV ingestion
//! - Storage gateway traits and an in-memory implementation

pub mod models;
pub mod services;
