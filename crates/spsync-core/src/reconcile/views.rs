use std::collections::HashSet;

use tracing::{debug, info, instrument};

use crate::backend::ListBackend;
use crate::error::{Result, SyncError};
use crate::model::{LibraryRef, ViewSpec};

/// Outcome of a view upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewReport {
    pub view_id: String,
    pub created: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Outcome of a default-view cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultViewCleanup {
    /// The default view is the protected one; nothing was touched.
    Protected { title: String },
    Cleaned { title: String, removed: Vec<String> },
}

/// Ensure a view exists with the required columns and without the forbidden ones.
///
/// Views are matched by title; with duplicate titles only the first is used.
/// Additions run before removals, one call at a time, and the first failing
/// call aborts the rest.
#[instrument(skip(backend, spec), fields(library = %library.library_url, view = %spec.title))]
pub async fn upsert_view<B>(backend: &B, library: &LibraryRef, spec: &ViewSpec) -> Result<ViewReport>
where
    B: ListBackend + ?Sized,
{
    if spec.title.trim().is_empty() {
        return Err(SyncError::InvalidInput(
            "view title is required".to_string(),
        ));
    }

    let views = backend.get_views(library).await?;
    debug!("Got {} views for {}", views.len(), library.library_url);

    let (view, created) = match views.into_iter().find(|v| v.title == spec.title) {
        Some(view) => (view, false),
        None => {
            info!(
                "View {} does not exist in {}, creating",
                spec.title, library.library_url
            );
            (backend.add_view(library, &spec.title).await?, true)
        }
    };

    let mut seen = HashSet::new();
    let columns_to_add: Vec<&String> = spec
        .columns
        .iter()
        .filter(|c| !view.columns.contains(c) && seen.insert(c.as_str()))
        .collect();

    if columns_to_add.is_empty() {
        debug!("All required columns already in view {}", spec.title);
    }
    let mut added = Vec::with_capacity(columns_to_add.len());
    for column in columns_to_add {
        info!("Adding column {} to view {}", column, spec.title);
        backend.add_view_field(library, &view.id, column).await?;
        added.push(column.clone());
    }

    let columns_to_remove: Vec<&String> = view
        .columns
        .iter()
        .filter(|c| spec.remove_columns_if_exists.contains(c))
        .collect();

    let mut removed = Vec::with_capacity(columns_to_remove.len());
    for column in columns_to_remove {
        info!("Removing column {} from view {}", column, spec.title);
        backend.remove_view_field(library, &view.id, column).await?;
        removed.push(column.clone());
    }

    Ok(ViewReport {
        view_id: view.id,
        created,
        added,
        removed,
    })
}

/// Remove fields from the list's default view, unless the default view is
/// the protected `except_title` view.
#[instrument(skip(backend, remove_fields), fields(library = %library.library_url))]
pub async fn clean_up_default_view<B>(
    backend: &B,
    library: &LibraryRef,
    remove_fields: &[String],
    except_title: &str,
) -> Result<DefaultViewCleanup>
where
    B: ListBackend + ?Sized,
{
    let views = backend.get_views(library).await?;
    let default_view = views.into_iter().find(|v| v.is_default).ok_or_else(|| {
        SyncError::NotFound(format!(
            "default view for {} in list {}",
            library.library_url, library.list_id
        ))
    })?;

    if default_view.title == except_title {
        info!(
            "Default view {} is the protected view, leaving it untouched",
            default_view.title
        );
        return Ok(DefaultViewCleanup::Protected {
            title: default_view.title,
        });
    }

    // Only fields currently in the view; removing an absent one is a remote error.
    let fields_to_remove: Vec<&String> = remove_fields
        .iter()
        .filter(|f| default_view.columns.contains(f))
        .collect();

    let mut removed = Vec::with_capacity(fields_to_remove.len());
    for field in fields_to_remove {
        info!("Removing column {} from default view {}", field, default_view.title);
        backend
            .remove_view_field(library, &default_view.id, field)
            .await?;
        removed.push(field.clone());
    }

    Ok(DefaultViewCleanup::Cleaned {
        title: default_view.title,
        removed,
    })
}

/// Delete the first view titled `title`. Returns `false` when no such view exists.
#[instrument(skip(backend), fields(library = %library.library_url))]
pub async fn remove_view<B>(backend: &B, library: &LibraryRef, title: &str) -> Result<bool>
where
    B: ListBackend + ?Sized,
{
    let views = backend.get_views(library).await?;
    if !views.iter().any(|v| v.title == title) {
        debug!("View {} not present, nothing to remove", title);
        return Ok(false);
    }

    info!("Removing view {} from {}", title, library.library_url);
    backend.remove_view(library, title).await?;
    Ok(true)
}
