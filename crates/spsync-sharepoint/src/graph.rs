//! Microsoft Graph request layer.
//!
//! Resources are paths relative to `{base_url}/{version}/`; absolute URLs
//! (next and delta links) are used verbatim. Collections are fetched with
//! `paged_request`, which follows `@odata.nextLink` and retries each page.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use spsync_core::{parse_library_url, DriveItemRef, Result, SyncError};
use tracing::{debug, info, instrument, warn};

use crate::token_manager::{TokenManager, GRAPH_SCOPE};
use crate::transport::{loggable, map_reqwest_error, Deadline, HttpTransport};

pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com";

const PAGE_ATTEMPTS: u32 = 3;

const GRAPH_ACCEPT: &str = "application/json;odata.metadata=minimal;odata.streaming=true";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApiVersion {
    #[default]
    V1,
    Beta,
}

impl ApiVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1.0",
            ApiVersion::Beta => "beta",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PageMode {
    #[default]
    All,
    FirstPage,
}

/// Options for one Graph call.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub version: ApiVersion,
    /// Sends `ConsistencyLevel: eventual` for advanced queries ($count, $search, ...).
    pub advanced_query: bool,
    pub page_mode: PageMode,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            version: ApiVersion::V1,
            advanced_query: false,
            page_mode: PageMode::All,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn beta(mut self) -> Self {
        self.version = ApiVersion::Beta;
        self
    }

    pub fn advanced(mut self) -> Self {
        self.advanced_query = true;
        self
    }

    pub fn first_page(mut self) -> Self {
        self.page_mode = PageMode::FirstPage;
        self
    }
}

/// Accumulated result of a paginated fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PagedResult {
    pub value: Vec<Value>,
    /// Present when the final page carried `@odata.deltaLink`.
    pub delta_link: Option<String>,
}

impl PagedResult {
    pub fn count(&self) -> usize {
        self.value.len()
    }
}

#[derive(Deserialize)]
struct GraphPage {
    #[serde(default)]
    value: Vec<Value>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
    #[serde(rename = "@odata.deltaLink")]
    delta_link: Option<String>,
}

/// Site and list ids resolved from a library web URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedList {
    pub site_id: String,
    pub list_id: String,
    pub site_name: String,
    pub list_name: String,
    pub tenant: String,
}

/// Graph API client for one tenant credential.
pub struct GraphClient {
    transport: Arc<HttpTransport>,
    tokens: Arc<TokenManager>,
    base_url: String,
}

impl GraphClient {
    pub fn new(
        transport: Arc<HttpTransport>,
        tokens: Arc<TokenManager>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            tokens,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    pub fn url_for(&self, resource: &str, version: ApiVersion) -> String {
        if resource.starts_with("https://") || resource.starts_with("http://") {
            return resource.to_string();
        }
        format!(
            "{}/{}/{}",
            self.base_url,
            version.as_str(),
            resource.trim_start_matches('/')
        )
    }

    async fn send(
        &self,
        resource: &str,
        options: &RequestOptions,
        deadline: Deadline,
    ) -> Result<reqwest::Response> {
        let url = self.url_for(resource, options.version);
        info!(
            method = %options.method,
            version = options.version.as_str(),
            advanced = options.advanced_query,
            "Graph request {}",
            loggable(&url)
        );
        self.transport
            .send_authorized(&self.tokens, GRAPH_SCOPE, deadline, |client| {
                let mut request = client
                    .request(options.method.clone(), &url)
                    .header("Accept", GRAPH_ACCEPT);
                if options.advanced_query {
                    request = request.header("ConsistencyLevel", "eventual");
                }
                if let Some(body) = &options.body {
                    request = request.json(body);
                }
                request
            })
            .await
    }

    /// Single Graph call returning the parsed JSON body (`Null` when empty).
    pub async fn request(&self, resource: &str, options: &RequestOptions) -> Result<Value> {
        let resp = self.send(resource, options, Deadline::Request).await?;
        let body = resp.bytes().await.map_err(map_reqwest_error)?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Single Graph call returning the body as a byte stream.
    pub async fn request_stream(
        &self,
        resource: &str,
        options: &RequestOptions,
    ) -> Result<BoxStream<'static, Result<Bytes>>> {
        let resp = self.send(resource, options, Deadline::Transfer).await?;
        Ok(resp.bytes_stream().map_err(map_reqwest_error).boxed())
    }

    /// Fetch a collection, following `@odata.nextLink` until exhausted.
    ///
    /// Each page is attempted up to three times without backoff; when a page
    /// fails three times the error propagates and nothing is returned.
    #[instrument(skip(self, resource, options), level = "debug", fields(resource = loggable(resource)))]
    pub async fn paged_request(
        &self,
        resource: &str,
        options: &RequestOptions,
    ) -> Result<PagedResult> {
        let mut result = PagedResult::default();
        let mut next = Some(resource.to_string());
        let mut page = 0;

        while let Some(current) = next.take() {
            let body = self.request_page(&current, options).await?;
            page += 1;

            let GraphPage {
                value,
                next_link,
                delta_link,
            } = serde_json::from_value(body)?;
            debug!("Got {} elements from page {}", value.len(), page);

            result.value.extend(value);
            if delta_link.is_some() {
                result.delta_link = delta_link;
            }
            if options.page_mode == PageMode::FirstPage {
                debug!("First page requested, stopping");
                break;
            }
            next = next_link;
        }

        info!("Found a total of {} elements in {} pages", result.count(), page);
        Ok(result)
    }

    async fn request_page(&self, resource: &str, options: &RequestOptions) -> Result<Value> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.request(resource, options).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < PAGE_ATTEMPTS => {
                    warn!(
                        "Graph page request failed (attempt {}/{}), retrying: {}",
                        attempt, PAGE_ATTEMPTS, e
                    );
                }
                Err(e) => {
                    warn!("Graph page request failed {} times, giving up: {}", attempt, e);
                    return Err(e);
                }
            }
        }
    }

    /// Resolve site and list ids for a library web URL by listing the site's lists.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_list_and_site_id(&self, web_url: &str) -> Result<ResolvedList> {
        let parts = parse_library_url(web_url)?;
        let resource = format!("sites/{}:/sites/{}:/lists", parts.domain, parts.site);
        let lists = self.paged_request(&resource, &RequestOptions::get()).await?;

        let wanted = web_url.trim_end_matches('/').to_lowercase();
        let list = lists
            .value
            .iter()
            .find(|list| {
                list.get("webUrl")
                    .and_then(Value::as_str)
                    .is_some_and(|url| url.trim_end_matches('/').to_lowercase() == wanted)
            })
            .ok_or_else(|| SyncError::NotFound(format!("no list or library at {web_url}")))?;

        let list_id = list
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::NotFound(format!("list at {web_url} has no id")))?;

        // parentReference.siteId is "{hostname},{siteGuid},{webGuid}"
        let site_id = list
            .pointer("/parentReference/siteId")
            .and_then(Value::as_str)
            .map(|id| id.split(',').nth(1).unwrap_or(id))
            .ok_or_else(|| SyncError::NotFound(format!("no site found for {web_url}")))?;

        Ok(ResolvedList {
            site_id: site_id.to_string(),
            list_id: list_id.to_string(),
            site_name: parts.site,
            list_name: parts.list_name,
            tenant: parts.tenant,
        })
    }

    pub async fn get_drive_item_from_list_item(
        &self,
        site_id: &str,
        list_id: &str,
        item_id: &str,
    ) -> Result<Value> {
        let resource = format!("sites/{site_id}/lists/{list_id}/items/{item_id}/driveItem");
        self.request(&resource, &RequestOptions::get()).await
    }

    pub async fn get_drive_item_version(&self, item: &DriveItemRef, version: &str) -> Result<Value> {
        let resource = format!(
            "drives/{}/items/{}/versions/{}",
            item.drive_id, item.item_id, version
        );
        self.request(&resource, &RequestOptions::get()).await
    }

    pub async fn get_drive_item_versions(&self, item: &DriveItemRef) -> Result<Vec<Value>> {
        let resource = format!("drives/{}/items/{}/versions", item.drive_id, item.item_id);
        Ok(self
            .paged_request(&resource, &RequestOptions::get())
            .await?
            .value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_options_builders() {
        let options = RequestOptions::post(serde_json::json!({})).beta().advanced().first_page();
        assert_eq!(options.method, Method::POST);
        assert_eq!(options.version.as_str(), "beta");
        assert!(options.advanced_query);
        assert_eq!(options.page_mode, PageMode::FirstPage);
        assert_eq!(RequestOptions::get().version, ApiVersion::V1);
    }
}
