//! Core traits and types for SharePoint library synchronisation.
//!
//! This crate defines the abstractions shared between the reconciliation engine
//! and the remote API implementations:
//! - `ListBackend`: column, view and content-type operations on one remote list
//! - `parse_library_url`: library web URL addressing
//! - `reconcile`: idempotent upserts of columns, views and formatters

mod address;
mod backend;
mod error;
mod model;
pub mod reconcile;

pub use address::{parse_library_url, LibraryUrl};
pub use backend::ListBackend;
pub use error::{Result, SyncError};
pub use model::{
    ChoiceSettings, ColumnDefinition, ColumnPatch, DriveItemRef, LibraryRef, RemoteColumn,
    RemoteContentType, RemoteView, ViewSpec,
};
pub use reconcile::{
    clean_up_default_view, remove_view, sync_content_type_formatter, upsert_columns, upsert_view,
    ColumnReport, DefaultViewCleanup, FormatterSync, ViewReport,
};
