use serde_json::Value;
use tracing::{info, instrument};

use crate::backend::ListBackend;
use crate::error::{Result, SyncError};
use crate::model::LibraryRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatterSync {
    Unchanged,
    Updated,
}

/// Structural comparison of an observed (serialized) formatter with the desired one.
/// A missing or unparseable observed formatter never matches.
pub fn formatter_matches(observed: Option<&str>, desired: &Value) -> bool {
    observed
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .is_some_and(|value| &value == desired)
}

/// Set the form formatter of the content type named `content_type_name`.
///
/// Exactly one content type must carry the name. No write is sent when the
/// observed formatter already matches.
#[instrument(skip(backend, formatter), fields(library = %library.library_url))]
pub async fn sync_content_type_formatter<B>(
    backend: &B,
    library: &LibraryRef,
    content_type_name: &str,
    formatter: &Value,
) -> Result<FormatterSync>
where
    B: ListBackend + ?Sized,
{
    let mut matches = backend
        .get_content_types(library, Some(content_type_name))
        .await?;

    if matches.len() != 1 {
        return Err(SyncError::AmbiguousContentType {
            name: content_type_name.to_string(),
            count: matches.len(),
        });
    }
    let content_type = matches.remove(0);

    if formatter_matches(content_type.client_form_custom_formatter.as_deref(), formatter) {
        info!(
            "Formatter of content type {} already correct for {}",
            content_type_name, library.library_url
        );
        return Ok(FormatterSync::Unchanged);
    }

    info!(
        "Updating formatter of content type {} ({}) for {}",
        content_type_name, content_type.id, library.library_url
    );
    backend
        .update_content_type_formatter(library, &content_type.id, formatter)
        .await?;
    Ok(FormatterSync::Updated)
}
