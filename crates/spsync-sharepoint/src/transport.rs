//! Shared HTTP transport.
//!
//! One pooled `reqwest::Client` is built at startup and shared by the token
//! manager, the Graph client and the REST client. API calls are bounded by the
//! request timeout; streaming downloads and upload chunks by the transfer
//! timeout.

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use spsync_core::{Result, SyncError};
use tracing::{debug, warn};

use crate::token_manager::TokenManager;

/// Which timeout applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Request,
    Transfer,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub request_timeout: Duration,
    pub transfer_timeout: Duration,
    pub max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            transfer_timeout: Duration::from_secs(600),
            max_idle_per_host: 200,
        }
    }
}

pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self { client, config })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn timeout(&self, deadline: Deadline) -> Duration {
        match deadline {
            Deadline::Request => self.config.request_timeout,
            Deadline::Transfer => self.config.transfer_timeout,
        }
    }

    /// Send a bearer-authenticated request built by `build`.
    ///
    /// A 401 response forces one token refresh for `scope` and one resend;
    /// any other non-2xx status becomes `SyncError::Remote`.
    pub async fn send_authorized<F>(
        &self,
        tokens: &TokenManager,
        scope: &str,
        deadline: Deadline,
        build: F,
    ) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let timeout = self.timeout(deadline);
        let token = tokens.get_token(scope).await?;
        let resp = build(&self.client)
            .bearer_auth(&token)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        if resp.status() != StatusCode::UNAUTHORIZED {
            return check_status(resp).await;
        }

        warn!("Got 401 for scope {}, forcing token refresh", scope);
        let token = tokens.refresh_token(scope).await?;
        let resp = build(&self.client)
            .bearer_auth(&token)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(resp).await
    }

    /// Send an unauthenticated request (upload-session URLs carry their own auth).
    pub async fn send(&self, deadline: Deadline, request: RequestBuilder) -> Result<Response> {
        let resp = request
            .timeout(self.timeout(deadline))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(resp).await
    }
}

/// Turn a non-2xx response into `SyncError::Remote`, keeping the body.
pub async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    debug!("Remote returned {}: {}", status, body);
    Err(SyncError::Remote {
        status: status.as_u16(),
        body,
    })
}

pub fn map_reqwest_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout(e.to_string())
    } else if e.is_decode() {
        SyncError::Network(format!("invalid response body: {e}"))
    } else {
        SyncError::Network(e.to_string())
    }
}

/// Unreserved URL characters stay readable, everything else is escaped.
const URL_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a user-supplied value (file name, OData literal) for use
/// inside a path segment or query value.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URL_COMPONENT).to_string()
}

/// Strip the skiptoken from a resource before it is logged.
pub fn loggable(resource: &str) -> &str {
    match resource.find("skiptoken=") {
        Some(pos) => &resource[..pos],
        None => resource,
    }
}
