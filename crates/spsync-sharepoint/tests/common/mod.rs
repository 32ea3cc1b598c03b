#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use spsync_core::{LibraryRef, Result};
use spsync_sharepoint::{
    AcquiredToken, HttpTransport, MemoryTokenStore, SharePointClient, TokenManager, TokenSource,
    TransportConfig,
};
use wiremock::MockServer;

/// Issues `token-1`, `token-2`, ... and records the requested scopes.
#[derive(Default)]
pub struct SequentialTokens {
    calls: AtomicU32,
    scopes: Mutex<Vec<String>>,
}

impl SequentialTokens {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn scopes(&self) -> Vec<String> {
        self.scopes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenSource for SequentialTokens {
    async fn acquire(&self, scope: &str) -> Result<AcquiredToken> {
        self.scopes.lock().unwrap().push(scope.to_string());
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AcquiredToken {
            access_token: format!("token-{n}"),
            expires_in: 3600,
        })
    }
}

pub struct TestClient {
    pub client: SharePointClient,
    pub tokens: Arc<SequentialTokens>,
}

/// Client whose Graph and REST calls both go to `server`.
pub fn client_for(server: &MockServer) -> TestClient {
    client_with_transport(server, TransportConfig::default())
}

pub fn client_with_transport(server: &MockServer, config: TransportConfig) -> TestClient {
    let transport = Arc::new(HttpTransport::new(config).unwrap());
    let tokens = Arc::new(SequentialTokens::default());
    let manager = Arc::new(TokenManager::new(
        "contoso",
        tokens.clone(),
        Arc::new(MemoryTokenStore::new()),
    ));
    let client = SharePointClient::with_rest_host(transport, manager, &server.uri(), &server.uri());
    TestClient { client, tokens }
}

pub fn library() -> LibraryRef {
    LibraryRef::new(
        "https://contoso.sharepoint.com/sites/Team/Docs",
        "site-1",
        "list-1",
    )
}
