//! Idempotent reconciliation of list columns, views and content-type formatters.
//!
//! Every operation fetches the observed state fresh, computes the minimal set
//! of remote calls and applies them sequentially. Re-running an operation
//! against converged state issues no mutating calls.

mod columns;
mod content_type;
mod views;

pub use columns::{diff_column, same_choices, upsert_columns, ColumnReport};
pub use content_type::{formatter_matches, sync_content_type_formatter, FormatterSync};
pub use views::{clean_up_default_view, remove_view, upsert_view, DefaultViewCleanup, ViewReport};
