//! Persistence layer for the expense tracker backend.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - PostgreSQL implementations of the domain storage gateways

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
