//! Domain models for the expense tracker.

pub mod batch;
pub mod batch_job;
pub mod expense;

pub use batch::{
    check_batch_size, BatchItemResult, BatchJobCreatedResponse, BatchRequestError,
    BatchUpdateItem, BatchUpdateResponse, CsvExpenseRow, MAX_ASYNC_BATCH_ITEMS,
    MAX_CSV_IMPORT_ROWS, MAX_SYNC_BATCH_ITEMS,
};
pub use batch_job::{
    BatchJob, BatchJobKind, BatchJobResponse, BatchJobStatus, JobProgress,
    NOTE_ABANDONED_ON_SHUTDOWN, NOTE_INTERRUPTED, NOTE_PROGRESS_NOT_SAVED,
};
pub use expense::{
    CreateExpenseRequest, Expense, ExpenseChanges, NewExpense, UpdateExpenseRequest,
};
