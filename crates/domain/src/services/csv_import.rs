//! CSV ingestion for bulk expense creation.
//!
//! The file must start with the header `title,amount,categoryid,date,notes`
//! (case-insensitive, surrounding whitespace ignored). Row numbers in
//! errors count the header as row 1, so the first data row is row 2.

use std::io::Read;

use csv::{ReaderBuilder, StringRecord, Trim};
use thiserror::Error;

use crate::models::CsvExpenseRow;

/// Header columns expected, in order.
pub const EXPECTED_CSV_HEADERS: [&str; 5] = ["title", "amount", "categoryid", "date", "notes"];

/// Errors rejecting a whole CSV upload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsvImportError {
    #[error("Invalid CSV format")]
    InvalidFormat,

    #[error("CSV must contain header and at least one row")]
    MissingRows,

    #[error("Invalid CSV header count. Expected headers: {}", EXPECTED_CSV_HEADERS.join(", "))]
    HeaderCount,

    #[error("Invalid CSV header at column {column}: expected '{expected}', got '{found}'")]
    HeaderMismatch {
        column: usize,
        expected: &'static str,
        found: String,
    },

    #[error("Row {row} has mismatched columns")]
    MismatchedColumns { row: usize },

    #[error("Invalid amount at row {row}")]
    InvalidAmount { row: usize },

    #[error("Invalid category ID at row {row}")]
    InvalidCategoryId { row: usize },

    #[error("Batch too large (max {max} rows)")]
    TooManyRows { max: usize },
}

/// Parses an uploaded CSV file into creation rows.
///
/// Rows are index-aligned with the data lines of the file. The row cap is
/// applied after every row parsed successfully.
pub fn parse_expense_csv<R: Read>(
    input: R,
    max_rows: usize,
) -> Result<Vec<CsvExpenseRow>, CsvImportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input);

    let records = reader
        .records()
        .collect::<Result<Vec<StringRecord>, _>>()
        .map_err(|e| {
            tracing::debug!(error = %e, "CSV upload could not be read");
            CsvImportError::InvalidFormat
        })?;

    if records.len() < 2 {
        return Err(CsvImportError::MissingRows);
    }

    let header = &records[0];
    check_header(header)?;

    let rows = records[1..]
        .iter()
        .enumerate()
        .map(|(i, record)| parse_row(record, i + 2, header.len()))
        .collect::<Result<Vec<_>, _>>()?;

    if rows.len() > max_rows {
        return Err(CsvImportError::TooManyRows { max: max_rows });
    }

    Ok(rows)
}

fn check_header(header: &StringRecord) -> Result<(), CsvImportError> {
    if header.len() != EXPECTED_CSV_HEADERS.len() {
        return Err(CsvImportError::HeaderCount);
    }

    for (i, expected) in EXPECTED_CSV_HEADERS.into_iter().enumerate() {
        let found = header.get(i).unwrap_or_default();
        if !found.trim().eq_ignore_ascii_case(expected) {
            return Err(CsvImportError::HeaderMismatch {
                column: i + 1,
                expected,
                found: found.to_string(),
            });
        }
    }

    Ok(())
}

fn parse_row(
    record: &StringRecord,
    row: usize,
    columns: usize,
) -> Result<CsvExpenseRow, CsvImportError> {
    if record.len() != columns {
        return Err(CsvImportError::MismatchedColumns { row });
    }

    let field = |i: usize| record.get(i).unwrap_or_default().trim();

    let amount = field(1)
        .parse::<f64>()
        .map_err(|_| CsvImportError::InvalidAmount { row })?;

    let category_id = match field(2) {
        "" => None,
        raw => Some(
            raw.parse::<i64>()
                .map_err(|_| CsvImportError::InvalidCategoryId { row })?,
        ),
    };

    let notes = match field(4) {
        "" => None,
        raw => Some(raw.to_string()),
    };

    Ok(CsvExpenseRow {
        title: field(0).to_string(),
        amount,
        category_id,
        date: field(3).to_string(),
        notes,
    })
}
