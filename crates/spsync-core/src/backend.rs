use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::model::{
    ColumnDefinition, ColumnPatch, LibraryRef, RemoteColumn, RemoteContentType, RemoteView,
};

/// Remote operations on one list that the reconciliation engine drives.
///
/// Implementations issue exactly one remote call per method (plus whatever
/// authentication they need); the engine decides which calls are necessary.
#[async_trait]
pub trait ListBackend: Send + Sync {
    /// Fetch every field of the list.
    async fn get_columns(&self, library: &LibraryRef) -> Result<Vec<RemoteColumn>>;

    /// Create a column from its definition and return the new column id.
    async fn create_column(
        &self,
        library: &LibraryRef,
        definition: &ColumnDefinition,
    ) -> Result<String>;

    /// Apply a partial update to an existing column.
    async fn modify_column(
        &self,
        library: &LibraryRef,
        column_id: &str,
        patch: &ColumnPatch,
    ) -> Result<()>;

    /// Fetch every view of the list, with its assigned fields.
    async fn get_views(&self, library: &LibraryRef) -> Result<Vec<RemoteView>>;

    /// Create a shared (non-personal) view.
    async fn add_view(&self, library: &LibraryRef, title: &str) -> Result<RemoteView>;

    /// Delete the first view with the given title.
    async fn remove_view(&self, library: &LibraryRef, title: &str) -> Result<()>;

    async fn add_view_field(&self, library: &LibraryRef, view_id: &str, field: &str)
        -> Result<()>;

    async fn remove_view_field(
        &self,
        library: &LibraryRef,
        view_id: &str,
        field: &str,
    ) -> Result<()>;

    /// Fetch content types, filtered by name when one is given.
    async fn get_content_types(
        &self,
        library: &LibraryRef,
        name: Option<&str>,
    ) -> Result<Vec<RemoteContentType>>;

    /// Replace the form formatter of a content type.
    async fn update_content_type_formatter(
        &self,
        library: &LibraryRef,
        content_type_id: &str,
        formatter: &Value,
    ) -> Result<()>;
}
