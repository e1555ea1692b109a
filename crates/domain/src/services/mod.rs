//! Domain services for the expense tracker.
//!
//! Services contain business logic that operates on domain models.

pub mod batch_items;
pub mod csv_import;
pub mod gateway;
pub mod in_memory;

pub use batch_items::{apply_create_item, apply_update_item, run_sync_batch_update};
pub use csv_import::{parse_expense_csv, CsvImportError, EXPECTED_CSV_HEADERS};
pub use gateway::{BatchJobStore, ExpenseGateway, GatewayError};
pub use in_memory::InMemoryStore;
