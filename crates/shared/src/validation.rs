//! Common validation utilities for expense fields.

use chrono::NaiveDate;
use validator::ValidationError;

/// Date format accepted for expense dates.
pub const EXPENSE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Validates that a required text field is not blank.
pub fn validate_not_blank(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some(format!("{} is required", field).into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Validates that an amount is strictly positive.
pub fn validate_positive_amount(amount: f64) -> Result<(), ValidationError> {
    if amount > 0.0 && amount.is_finite() {
        Ok(())
    } else {
        let mut err = ValidationError::new("amount_range");
        err.message = Some("amount must be greater than 0".into());
        Err(err)
    }
}

/// Parses a `YYYY-MM-DD` expense date.
pub fn parse_expense_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), EXPENSE_DATE_FORMAT).map_err(|_| {
        let mut err = ValidationError::new("date_format");
        err.message = Some("invalid date format (expected YYYY-MM-DD)".into());
        err
    })
}

/// Validates a required expense date.
pub fn validate_expense_date(value: &str) -> Result<(), ValidationError> {
    validate_not_blank("date", value)?;
    parse_expense_date(value).map(|_| ())
}

/// Extracts the human readable message of a validation error.
pub fn error_message(err: &ValidationError) -> String {
    err.message
        .as_ref()
        .map(|m| m.to_string())
        .unwrap_or_else(|| err.code.to_string())
}
