//! Expense domain models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::validation::{
    parse_expense_date, validate_not_blank, validate_positive_amount, EXPENSE_DATE_FORMAT,
};
use validator::{Validate, ValidationError};

/// A stored expense record owned by a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
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

impl Expense {
    /// Returns the expense date in `YYYY-MM-DD` form.
    pub fn date_string(&self) -> String {
        self.date.format(EXPENSE_DATE_FORMAT).to_string()
    }
}

/// Request to create an expense.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateExpenseRequest {
    #[validate(length(max = 255, message = "title must be at most 255 characters"))]
    pub title: String,

    pub amount: f64,

    pub category_id: Option<i64>,

    pub date: String,

    #[validate(length(max = 2000, message = "notes must be at most 2000 characters"))]
    pub notes: Option<String>,

    pub image_url: Option<String>,
}

/// A creation request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub title: String,
    pub amount: f64,
    pub category_id: Option<i64>,
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub image_url: Option<String>,
}

impl CreateExpenseRequest {
    /// Applies the creation rules and returns the validated record.
    ///
    /// Rules are checked in a fixed order so the reported reason is stable:
    /// title, amount, date, then field lengths.
    pub fn to_new_expense(&self) -> Result<NewExpense, ValidationError> {
        validate_not_blank("title", &self.title)?;
        validate_positive_amount(self.amount)?;
        validate_not_blank("date", &self.date)?;
        let date = parse_expense_date(&self.date)?;
        self.validate().map_err(first_length_error)?;

        Ok(NewExpense {
            title: self.title.trim().to_string(),
            amount: self.amount,
            category_id: self.category_id,
            date,
            notes: normalize_optional(self.notes.as_deref()),
            image_url: normalize_optional(self.image_url.as_deref()),
        })
    }
}

/// Partial update of an expense. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExpenseRequest {
    #[validate(length(max = 255, message = "title must be at most 255 characters"))]
    pub title: Option<String>,

    pub amount: Option<f64>,

    pub category_id: Option<i64>,

    pub date: Option<String>,

    #[validate(length(max = 2000, message = "notes must be at most 2000 characters"))]
    pub notes: Option<String>,

    pub image_url: Option<String>,
}

/// Validated set of changes for an expense.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseChanges {
    pub title: Option<String>,
    pub amount: Option<f64>,
    pub category_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub image_url: Option<String>,
}

impl UpdateExpenseRequest {
    /// Applies the update rules to the provided fields.
    ///
    /// A blank date is treated as "not provided".
    pub fn to_changes(&self) -> Result<ExpenseChanges, ValidationError> {
        if let Some(title) = &self.title {
            validate_not_blank("title", title)?;
        }
        if let Some(amount) = self.amount {
            validate_positive_amount(amount)?;
        }
        let date = match self.date.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => Some(parse_expense_date(value)?),
            _ => None,
        };
        self.validate().map_err(first_length_error)?;

        Ok(ExpenseChanges {
            title: self.title.as_ref().map(|t| t.trim().to_string()),
            amount: self.amount,
            category_id: self.category_id,
            date,
            notes: self.notes.clone(),
            image_url: self.image_url.clone(),
        })
    }
}

impl ExpenseChanges {
    /// Returns true when no field would change.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.amount.is_none()
            && self.category_id.is_none()
            && self.date.is_none()
            && self.notes.is_none()
            && self.image_url.is_none()
    }
}

fn normalize_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn first_length_error(errors: validator::ValidationErrors) -> ValidationError {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .into_iter()
        .flat_map(|(_, errs)| errs.iter().cloned())
        .next()
        .unwrap_or_else(|| ValidationError::new("invalid"))
}
