//! A client bound to one SharePoint tenant credential.

use std::sync::Arc;

use crate::backend::SharePointBackend;
use crate::graph::GraphClient;
use crate::rest::RestClient;
use crate::token_manager::TokenManager;
use crate::transport::HttpTransport;

/// Graph and REST clients sharing one transport and one token manager.
pub struct SharePointClient {
    pub graph: Arc<GraphClient>,
    pub rest: Arc<RestClient>,
    tokens: Arc<TokenManager>,
}

impl SharePointClient {
    pub fn new(transport: Arc<HttpTransport>, tokens: Arc<TokenManager>, graph_url: &str) -> Self {
        let graph = Arc::new(GraphClient::new(transport.clone(), tokens.clone(), graph_url));
        let rest = Arc::new(RestClient::new(transport, tokens.clone()));
        Self { graph, rest, tokens }
    }

    /// Same as `new`, with REST calls sent to `rest_host` instead of the tenant host.
    pub fn with_rest_host(
        transport: Arc<HttpTransport>,
        tokens: Arc<TokenManager>,
        graph_url: &str,
        rest_host: &str,
    ) -> Self {
        let graph = Arc::new(GraphClient::new(transport.clone(), tokens.clone(), graph_url));
        let rest = Arc::new(RestClient::new(transport, tokens.clone()).with_host(rest_host));
        Self { graph, rest, tokens }
    }

    pub fn tenant_name(&self) -> &str {
        self.tokens.tenant_name()
    }

    pub fn backend(&self) -> SharePointBackend {
        SharePointBackend::new(self.graph.clone(), self.rest.clone())
    }
}
