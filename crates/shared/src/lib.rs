//! Shared utilities and common types for the expense tracker backend.
//!
//! This crate provides functionality used across the other crates:
//! - JWT validation for the bearer-token boundary
//! - Common field validation for expense records

pub mod jwt;
pub mod validation;
