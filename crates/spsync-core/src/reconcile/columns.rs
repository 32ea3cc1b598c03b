use std::collections::HashSet;

use tracing::{debug, error, info, instrument, warn};

use crate::backend::ListBackend;
use crate::error::Result;
use crate::model::{ColumnDefinition, ColumnPatch, LibraryRef, RemoteColumn};

/// Outcome of one column upsert pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnReport {
    pub created: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: Vec<String>,
    /// (column name, error message)
    pub failed: Vec<(String, String)>,
}

impl ColumnReport {
    /// True when the pass found nothing to change and nothing failed.
    pub fn is_converged(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.failed.is_empty()
    }
}

/// Order-independent comparison of choice values.
pub fn same_choices(observed: &[String], desired: &[String]) -> bool {
    let observed: HashSet<&str> = observed.iter().map(String::as_str).collect();
    let desired: HashSet<&str> = desired.iter().map(String::as_str).collect();
    observed == desired
}

/// Compute the patch bringing `observed` in line with `desired`.
///
/// The formatter is only compared when the definition declares one, and
/// choices only for choice definitions. The observed type tag is always
/// carried so the remote accepts the update.
pub fn diff_column(desired: &ColumnDefinition, observed: &RemoteColumn) -> ColumnPatch {
    let mut patch = ColumnPatch {
        type_tag: Some(observed.type_tag.clone()),
        ..Default::default()
    };

    if let Some(formatter) = desired.declared_formatter() {
        if observed.custom_formatter.as_deref() != Some(formatter) {
            patch.custom_formatter = Some(formatter.to_string());
        }
    }
    if observed.display_name != desired.display_name {
        patch.display_name = Some(desired.display_name.clone());
    }
    if observed.description != desired.description {
        patch.description = Some(desired.description.clone());
    }
    if let Some(choice) = &desired.choice {
        if !same_choices(&observed.choices, &choice.choices) {
            patch.choices = Some(choice.choices.clone());
        }
    }

    patch
}

/// Create missing columns and fix drifted ones. Never deletes a column and
/// never touches a column's type.
///
/// Modifications are applied before creations. A failure on one column is
/// logged, recorded in the report and does not stop the others; only the
/// initial fetch of remote columns can fail the whole pass.
#[instrument(skip(backend, desired), fields(library = %library.library_url, count = desired.len()))]
pub async fn upsert_columns<B>(
    backend: &B,
    library: &LibraryRef,
    desired: &[ColumnDefinition],
) -> Result<ColumnReport>
where
    B: ListBackend + ?Sized,
{
    let remote = backend.get_columns(library).await.map_err(|e| {
        error!("Failed to fetch columns for {}: {}", library.library_url, e);
        e
    })?;
    debug!("Got {} remote columns", remote.len());

    let mut report = ColumnReport::default();
    let mut to_create: Vec<&ColumnDefinition> = Vec::new();
    let mut queued: HashSet<&str> = HashSet::new();

    for definition in desired {
        let Some(observed) = remote.iter().find(|c| c.name == definition.name) else {
            if queued.insert(definition.name.as_str()) {
                to_create.push(definition);
            } else {
                warn!("Column {} declared twice, creating it once", definition.name);
            }
            continue;
        };

        let patch = diff_column(definition, observed);
        if patch.is_empty() {
            debug!("Column {} already up to date", definition.name);
            report.unchanged.push(definition.name.clone());
            continue;
        }

        info!(
            column = %definition.name,
            fields = ?patch.changed_fields(),
            "Column differs from definition, modifying"
        );
        match backend.modify_column(library, &observed.id, &patch).await {
            Ok(()) => report.modified.push(definition.name.clone()),
            Err(e) => {
                error!(
                    "Failed to modify column {} in {}, will converge on next run: {}",
                    definition.name, library.library_url, e
                );
                report
                    .failed
                    .push((definition.name.clone(), e.to_string()));
            }
        }
    }

    if !to_create.is_empty() {
        info!(
            "Creating {} missing columns in {}",
            to_create.len(),
            library.library_url
        );
    }

    for definition in to_create {
        let column_id = match backend.create_column(library, definition).await {
            Ok(id) => id,
            Err(e) => {
                error!(
                    "Failed to create column {} in {}, will converge on next run: {}",
                    definition.name, library.library_url, e
                );
                report
                    .failed
                    .push((definition.name.clone(), e.to_string()));
                continue;
            }
        };
        report.created.push(definition.name.clone());

        if let Some(formatter) = definition.declared_formatter() {
            debug!("Attaching formatter to new column {}", definition.name);
            let patch = ColumnPatch::formatter(formatter);
            if let Err(e) = backend.modify_column(library, &column_id, &patch).await {
                error!(
                    "Failed to attach formatter to column {} in {}: {}",
                    definition.name, library.library_url, e
                );
                report
                    .failed
                    .push((definition.name.clone(), format!("formatter: {e}")));
            }
        }
    }

    Ok(report)
}
