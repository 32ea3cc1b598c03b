//! Legacy SharePoint REST client (`/_api/web/...`, verbose OData).
//!
//! Requests go to `https://{tenant}.sharepoint.com/sites/{site}/_api/`, derived
//! from the library URL, with the tenant's SharePoint token audience. Writes
//! are POSTs, with `X-HTTP-Method: MERGE` or `DELETE` for updates and deletes.

use std::sync::Arc;

use reqwest::Method;
use serde::de::{DeserializeOwned, Error as _};
use serde::Deserialize;
use serde_json::Value;
use spsync_core::{parse_library_url, LibraryRef, LibraryUrl, Result};
use tracing::{info, instrument};

use crate::token_manager::{sharepoint_scope, TokenManager};
use crate::transport::{encode_component, map_reqwest_error, Deadline, HttpTransport};

const VERBOSE_JSON: &str = "application/json;odata=verbose";

/// `{"results": [...]}` wrapper used by verbose OData collections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Results<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(rename = "type", default)]
    pub type_name: String,
}

/// A list field as returned by `fields?$select=...`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestField {
    pub id: String,
    pub internal_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub custom_formatter: Option<String>,
    #[serde(default)]
    pub choices: Option<Results<String>>,
    #[serde(rename = "__metadata", default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestViewFields {
    #[serde(default)]
    pub items: Results<String>,
}

/// A list view with `$expand=ViewFields`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestView {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub default_view: bool,
    #[serde(default)]
    pub view_fields: Option<RestViewFields>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestContentType {
    pub string_id: String,
    pub name: String,
    #[serde(default)]
    pub client_form_custom_formatter: Option<String>,
}

/// Escape a value for use inside an OData string literal.
fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// An OData string literal ready to be placed in the URL.
fn url_literal(value: &str) -> String {
    encode_component(&odata_literal(value))
}

/// Pull `d.results` out of a verbose collection response.
fn verbose_results<T: DeserializeOwned>(body: Value) -> Result<Vec<T>> {
    match body {
        Value::Object(mut map) => {
            let results = map
                .get_mut("d")
                .and_then(|d| d.get_mut("results"))
                .map(Value::take)
                .ok_or_else(|| serde_json::Error::custom("missing d.results in response"))?;
            Ok(serde_json::from_value(results)?)
        }
        _ => Err(serde_json::Error::custom("expected a JSON object").into()),
    }
}

/// Pull `d` out of a verbose single-entity response.
fn verbose_entity<T: DeserializeOwned>(body: Value) -> Result<T> {
    match body {
        Value::Object(mut map) => {
            let entity = map
                .remove("d")
                .ok_or_else(|| serde_json::Error::custom("missing d in response"))?;
            Ok(serde_json::from_value(entity)?)
        }
        _ => Err(serde_json::Error::custom("expected a JSON object").into()),
    }
}

/// Legacy REST client for one tenant credential.
pub struct RestClient {
    transport: Arc<HttpTransport>,
    tokens: Arc<TokenManager>,
    /// Replaces `https://{tenant}.sharepoint.com` (tests point this at a mock server).
    host_override: Option<String>,
}

impl RestClient {
    pub fn new(transport: Arc<HttpTransport>, tokens: Arc<TokenManager>) -> Self {
        Self {
            transport,
            tokens,
            host_override: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host_override = Some(host.into().trim_end_matches('/').to_string());
        self
    }

    fn site_api_url(&self, parts: &LibraryUrl, query: &str) -> String {
        match &self.host_override {
            Some(host) => format!("{}/sites/{}/_api/{}", host, parts.site, query),
            None => format!("{}/_api/{}", parts.site_url(), query),
        }
    }

    async fn call(
        &self,
        library: &LibraryRef,
        method: Method,
        query: &str,
        body: Option<&Value>,
        x_http_method: Option<&'static str>,
    ) -> Result<Value> {
        let parts = parse_library_url(&library.library_url)?;
        let url = self.site_api_url(&parts, query);
        let scope = sharepoint_scope(&parts.tenant);
        let payload = body.map(serde_json::to_vec).transpose()?;
        info!("Calling SharePoint REST api {} {}", method, url);

        let resp = self
            .transport
            .send_authorized(&self.tokens, &scope, Deadline::Request, |client| {
                let mut request = client
                    .request(method.clone(), &url)
                    .header("Accept", VERBOSE_JSON)
                    .header("Content-Type", VERBOSE_JSON);
                if let Some(verb) = x_http_method {
                    request = request.header("X-HTTP-Method", verb);
                }
                if let Some(payload) = &payload {
                    request = request.body(payload.clone());
                }
                request
            })
            .await?;

        let bytes = resp.bytes().await.map_err(map_reqwest_error)?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[instrument(skip(self, library), level = "debug", fields(list = %library.list_id))]
    pub async fn get_fields(&self, library: &LibraryRef) -> Result<Vec<RestField>> {
        let query = format!(
            "web/lists(guid'{}')/fields?$select=Id,CustomFormatter,InternalName,StaticName,Title,Choices,Description",
            library.list_id
        );
        let body = self.call(library, Method::GET, &query, None, None).await?;
        verbose_results(body)
    }

    #[instrument(skip(self, library, body), level = "debug", fields(list = %library.list_id))]
    pub async fn merge_field(&self, library: &LibraryRef, field_id: &str, body: &Value) -> Result<()> {
        let query = format!("web/lists(guid'{}')/fields('{}')", library.list_id, field_id);
        self.call(library, Method::POST, &query, Some(body), Some("MERGE"))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, library), level = "debug", fields(list = %library.list_id))]
    pub async fn get_views(&self, library: &LibraryRef) -> Result<Vec<RestView>> {
        let query = format!("web/lists(guid'{}')/views?$expand=ViewFields", library.list_id);
        let body = self.call(library, Method::GET, &query, None, None).await?;
        verbose_results(body)
    }

    /// Create a shared (non-personal) view.
    #[instrument(skip(self, library), level = "debug", fields(list = %library.list_id))]
    pub async fn add_view(&self, library: &LibraryRef, title: &str) -> Result<RestView> {
        let query = format!("web/lists(guid'{}')/views?$expand=ViewFields", library.list_id);
        let body = serde_json::json!({
            "__metadata": { "type": "SP.View" },
            "Title": title,
            "PersonalView": false
        });
        let created = self
            .call(library, Method::POST, &query, Some(&body), None)
            .await?;
        verbose_entity(created)
    }

    /// Delete the first view titled `title`.
    #[instrument(skip(self, library), level = "debug", fields(list = %library.list_id))]
    pub async fn remove_view(&self, library: &LibraryRef, title: &str) -> Result<()> {
        let query = format!(
            "web/lists(guid'{}')/views/getbytitle('{}')",
            library.list_id,
            url_literal(title)
        );
        self.call(
            library,
            Method::POST,
            &query,
            Some(&serde_json::json!({})),
            Some("DELETE"),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, library), level = "debug", fields(list = %library.list_id))]
    pub async fn add_view_field(&self, library: &LibraryRef, view_id: &str, field: &str) -> Result<()> {
        let query = format!(
            "web/lists(guid'{}')/views('{}')/viewfields/addviewfield('{}')",
            library.list_id,
            view_id,
            url_literal(field)
        );
        self.call(library, Method::POST, &query, Some(&serde_json::json!({})), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, library), level = "debug", fields(list = %library.list_id))]
    pub async fn remove_view_field(
        &self,
        library: &LibraryRef,
        view_id: &str,
        field: &str,
    ) -> Result<()> {
        let query = format!(
            "web/lists(guid'{}')/views('{}')/viewfields/removeviewfield('{}')",
            library.list_id,
            view_id,
            url_literal(field)
        );
        self.call(library, Method::POST, &query, Some(&serde_json::json!({})), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, library), level = "debug", fields(list = %library.list_id))]
    pub async fn get_content_types(
        &self,
        library: &LibraryRef,
        name: Option<&str>,
    ) -> Result<Vec<RestContentType>> {
        let mut query = format!("web/lists('{}')/contenttypes", library.list_id);
        if let Some(name) = name {
            let filter = format!("Name eq '{}'", odata_literal(name));
            query.push_str(&format!("?$filter={}", encode_component(&filter)));
        }
        let body = self.call(library, Method::GET, &query, None, None).await?;
        verbose_results(body)
    }

    #[instrument(skip(self, library, body), level = "debug", fields(list = %library.list_id))]
    pub async fn merge_content_type(
        &self,
        library: &LibraryRef,
        content_type_id: &str,
        body: &Value,
    ) -> Result<()> {
        let query = format!(
            "web/lists('{}')/contenttypes('{}')",
            library.list_id, content_type_id
        );
        self.call(library, Method::POST, &query, Some(body), Some("MERGE"))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_verbose_fields() {
        let body = json!({
            "d": { "results": [
                {
                    "__metadata": { "type": "SP.FieldMultiChoice" },
                    "Id": "f-1",
                    "InternalName": "ptd_publisering",
                    "StaticName": "ptd_publisering",
                    "Title": "Publiseres til",
                    "Description": "",
                    "CustomFormatter": null,
                    "Choices": { "__metadata": { "type": "Collection(Edm.String)" }, "results": ["Innsida", "Web"] }
                },
                {
                    "__metadata": { "type": "SP.FieldText" },
                    "Id": "f-2",
                    "InternalName": "Title",
                    "Title": "Tittel",
                    "Description": null
                }
            ]}
        });

        let fields: Vec<RestField> = verbose_results(body).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].metadata.type_name, "SP.FieldMultiChoice");
        assert_eq!(fields[0].choices.as_ref().unwrap().results, vec!["Innsida", "Web"]);
        assert!(fields[1].choices.is_none());
        assert!(fields[1].description.is_none());
    }

    #[test]
    fn test_parse_view_without_expanded_fields() {
        let body = json!({ "d": {
            "Id": "v-1",
            "Title": "Publisering",
            "DefaultView": false,
            "ViewFields": { "__deferred": { "uri": "https://x" } }
        }});
        let view: RestView = verbose_entity(body).unwrap();
        assert!(view.view_fields.unwrap().items.results.is_empty());
    }

    #[test]
    fn test_missing_results_is_json_error() {
        let err = verbose_results::<RestField>(json!({ "value": [] })).unwrap_err();
        assert!(matches!(err, spsync_core::SyncError::Json(_)));
    }

    #[test]
    fn test_odata_literal_doubles_quotes() {
        assert_eq!(odata_literal("Kari's view"), "Kari''s view");
        assert_eq!(url_literal("Kari's #1"), "Kari%27%27s%20%231");
    }
}
