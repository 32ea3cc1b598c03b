//! `ListBackend` over Graph (column creation) and legacy REST (everything else).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use spsync_core::{
    ColumnDefinition, ColumnPatch, LibraryRef, ListBackend, RemoteColumn, RemoteContentType,
    RemoteView, Result, SyncError,
};
use tracing::{debug, instrument};

use crate::graph::{GraphClient, RequestOptions};
use crate::rest::{RestClient, RestContentType, RestField, RestView};

/// SharePoint list backend for one tenant.
pub struct SharePointBackend {
    graph: Arc<GraphClient>,
    rest: Arc<RestClient>,
}

impl SharePointBackend {
    pub fn new(graph: Arc<GraphClient>, rest: Arc<RestClient>) -> Self {
        Self { graph, rest }
    }
}

impl From<RestField> for RemoteColumn {
    fn from(field: RestField) -> Self {
        RemoteColumn {
            id: field.id,
            name: field.internal_name,
            display_name: field.title.unwrap_or_default(),
            description: field.description.unwrap_or_default(),
            custom_formatter: field.custom_formatter.filter(|f| !f.is_empty()),
            choices: field.choices.map(|c| c.results).unwrap_or_default(),
            type_tag: field.metadata.type_name,
        }
    }
}

impl From<RestView> for RemoteView {
    fn from(view: RestView) -> Self {
        RemoteView {
            id: view.id,
            title: view.title,
            is_default: view.default_view,
            columns: view
                .view_fields
                .map(|fields| fields.items.results)
                .unwrap_or_default(),
        }
    }
}

impl From<RestContentType> for RemoteContentType {
    fn from(ct: RestContentType) -> Self {
        RemoteContentType {
            id: ct.string_id,
            name: ct.name,
            client_form_custom_formatter: ct.client_form_custom_formatter.filter(|f| !f.is_empty()),
        }
    }
}

/// MERGE body for a field patch. `__metadata` is only sent when the patch
/// carries the observed type tag.
pub fn field_patch_body(patch: &ColumnPatch) -> Value {
    let mut body = Map::new();
    if let Some(type_tag) = &patch.type_tag {
        body.insert("__metadata".into(), json!({ "type": type_tag }));
    }
    if let Some(formatter) = &patch.custom_formatter {
        body.insert("CustomFormatter".into(), json!(formatter));
    }
    if let Some(title) = &patch.display_name {
        body.insert("Title".into(), json!(title));
    }
    if let Some(description) = &patch.description {
        body.insert("Description".into(), json!(description));
    }
    if let Some(choices) = &patch.choices {
        body.insert(
            "Choices".into(),
            json!({
                "__metadata": { "type": "Collection(Edm.String)" },
                "results": choices
            }),
        );
    }
    Value::Object(body)
}

/// MERGE body setting a content type's form formatter (stored serialized).
pub fn content_type_formatter_body(formatter: &Value) -> Result<Value> {
    Ok(json!({
        "__metadata": { "type": "SP.ContentType" },
        "ClientFormCustomFormatter": serde_json::to_string(formatter)?
    }))
}

#[async_trait]
impl ListBackend for SharePointBackend {
    async fn get_columns(&self, library: &LibraryRef) -> Result<Vec<RemoteColumn>> {
        let fields = self.rest.get_fields(library).await?;
        Ok(fields.into_iter().map(RemoteColumn::from).collect())
    }

    #[instrument(skip(self, library, definition), level = "debug", fields(column = %definition.name))]
    async fn create_column(
        &self,
        library: &LibraryRef,
        definition: &ColumnDefinition,
    ) -> Result<String> {
        let resource = format!("sites/{}/lists/{}/columns", library.site_id, library.list_id);
        let created = self
            .graph
            .request(&resource, &RequestOptions::post(definition.create_body()))
            .await?;
        let id = created
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::Remote {
                status: 200,
                body: format!("column create response without id: {created}"),
            })?;
        debug!("Created column {} with id {}", definition.name, id);
        Ok(id.to_string())
    }

    async fn modify_column(
        &self,
        library: &LibraryRef,
        column_id: &str,
        patch: &ColumnPatch,
    ) -> Result<()> {
        self.rest
            .merge_field(library, column_id, &field_patch_body(patch))
            .await
    }

    async fn get_views(&self, library: &LibraryRef) -> Result<Vec<RemoteView>> {
        let views = self.rest.get_views(library).await?;
        Ok(views.into_iter().map(RemoteView::from).collect())
    }

    async fn add_view(&self, library: &LibraryRef, title: &str) -> Result<RemoteView> {
        Ok(self.rest.add_view(library, title).await?.into())
    }

    async fn remove_view(&self, library: &LibraryRef, title: &str) -> Result<()> {
        self.rest.remove_view(library, title).await
    }

    async fn add_view_field(&self, library: &LibraryRef, view_id: &str, field: &str) -> Result<()> {
        self.rest.add_view_field(library, view_id, field).await
    }

    async fn remove_view_field(
        &self,
        library: &LibraryRef,
        view_id: &str,
        field: &str,
    ) -> Result<()> {
        self.rest.remove_view_field(library, view_id, field).await
    }

    async fn get_content_types(
        &self,
        library: &LibraryRef,
        name: Option<&str>,
    ) -> Result<Vec<RemoteContentType>> {
        let content_types = self.rest.get_content_types(library, name).await?;
        Ok(content_types
            .into_iter()
            .map(RemoteContentType::from)
            .collect())
    }

    async fn update_content_type_formatter(
        &self,
        library: &LibraryRef,
        content_type_id: &str,
        formatter: &Value,
    ) -> Result<()> {
        let body = content_type_formatter_body(formatter)?;
        self.rest
            .merge_content_type(library, content_type_id, &body)
            .await
    }
}
