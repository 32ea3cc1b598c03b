//! Per-tenant bearer token manager with caching and forced refresh.
//!
//! Tokens are acquired from a `TokenSource` (the certificate credential in
//! production), cached in a `TokenStore` under `{tenantName}:{scope}`, and
//! treated as expired five minutes before the reported expiry.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use spsync_core::{Result, SyncError};
use tracing::{debug, info, instrument, warn};

use crate::transport::{Deadline, HttpTransport};

pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

const ACQUIRE_ATTEMPTS: u32 = 3;

/// Audience for the legacy REST API of a tenant.
pub fn sharepoint_scope(tenant: &str) -> String {
    format!("https://{tenant}.sharepoint.com/.default")
}

/// A freshly issued token.
#[derive(Debug, Clone)]
pub struct AcquiredToken {
    pub access_token: String,
    /// Lifetime in seconds as reported by the identity provider.
    pub expires_in: i64,
}

/// Something that can obtain a new token for a scope.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn acquire(&self, scope: &str) -> Result<AcquiredToken>;
}

/// Cached token with expiration.
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at - Duration::minutes(5)
    }
}

pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Option<CachedToken>;
    fn set(&self, key: &str, token: CachedToken);
    fn expire(&self, key: &str);
}

/// In-memory store, shareable across tenants (keys are tenant-namespaced).
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: DashMap<String, CachedToken>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<CachedToken> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    fn set(&self, key: &str, token: CachedToken) {
        self.entries.insert(key.to_string(), token);
    }

    fn expire(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// Absolute expiry of a token reported to live `expires_in` seconds.
fn expiry_from_now(expires_in: i64) -> Result<DateTime<Utc>> {
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| SyncError::Auth(format!("token lifetime out of range: {expires_in}s")))
}

/// Manages bearer tokens for one tenant credential.
pub struct TokenManager {
    tenant_name: String,
    source: Arc<dyn TokenSource>,
    store: Arc<dyn TokenStore>,
}

impl TokenManager {
    pub fn new(
        tenant_name: impl Into<String>,
        source: Arc<dyn TokenSource>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            tenant_name: tenant_name.into(),
            source,
            store,
        }
    }

    pub fn tenant_name(&self) -> &str {
        &self.tenant_name
    }

    fn cache_key(&self, scope: &str) -> String {
        format!("{}:{}", self.tenant_name, scope)
    }

    /// Get a valid token for `scope`, acquiring a new one on miss or expiry.
    pub async fn get_token(&self, scope: &str) -> Result<String> {
        let key = self.cache_key(scope);
        if let Some(cached) = self.store.get(&key) {
            if !cached.is_expired() {
                debug!("Token cache hit for {}", key);
                return Ok(cached.access_token);
            }
            debug!("Token expired for {}, acquiring new", key);
            self.store.expire(&key);
        }
        self.acquire(&key, scope).await
    }

    /// Bypass the cache and acquire a new token for `scope`.
    pub async fn refresh_token(&self, scope: &str) -> Result<String> {
        let key = self.cache_key(scope);
        self.store.expire(&key);
        self.acquire(&key, scope).await
    }

    async fn acquire(&self, key: &str, scope: &str) -> Result<String> {
        let mut attempt = 0;
        let acquired = loop {
            attempt += 1;
            match self.source.acquire(scope).await {
                Ok(token) => break token,
                Err(e) if attempt < ACQUIRE_ATTEMPTS => {
                    warn!(
                        "Token acquisition for {} failed (attempt {}/{}): {}",
                        key, attempt, ACQUIRE_ATTEMPTS, e
                    );
                }
                Err(e) => {
                    warn!("Token acquisition for {} failed {} times, giving up", key, attempt);
                    return Err(match e {
                        SyncError::Auth(msg) => SyncError::Auth(msg),
                        other => SyncError::Auth(other.to_string()),
                    });
                }
            }
        };

        let expires_at = expiry_from_now(acquired.expires_in)?;
        self.store.set(
            key,
            CachedToken {
                access_token: acquired.access_token.clone(),
                expires_at,
            },
        );
        info!(
            "Acquired token for {}, expires at {}",
            key,
            expires_at.to_rfc3339()
        );
        Ok(acquired.access_token)
    }
}

/// Errors loading or using the certificate credential.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to read private key {path}: {source}")]
    ReadKey {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid private key: {0}")]
    InvalidKey(jsonwebtoken::errors::Error),

    #[error("invalid certificate thumbprint: {0}")]
    InvalidThumbprint(#[from] hex::FromHexError),

    #[error("failed to sign client assertion: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

impl From<CredentialError> for SyncError {
    fn from(e: CredentialError) -> Self {
        SyncError::Auth(e.to_string())
    }
}

/// Client assertion claims for the identity platform.
#[derive(Debug, Serialize)]
struct AssertionClaims {
    aud: String,
    iss: String,
    sub: String,
    jti: String,
    nbf: i64,
    iat: i64,
    exp: i64,
}

/// App-only credential: client id plus a certificate's private key and thumbprint.
pub struct CertificateCredential {
    transport: Arc<HttpTransport>,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    key: EncodingKey,
    x5t: String,
}

impl CertificateCredential {
    pub fn new(
        transport: Arc<HttpTransport>,
        authority_host: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        private_key_pem: &[u8],
        thumbprint_hex: &str,
    ) -> std::result::Result<Self, CredentialError> {
        let key = EncodingKey::from_rsa_pem(private_key_pem).map_err(CredentialError::InvalidKey)?;
        let thumbprint = hex::decode(thumbprint_hex.trim().replace(':', ""))?;
        Ok(Self {
            transport,
            authority_host: authority_host.into().trim_end_matches('/').to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            key,
            x5t: URL_SAFE_NO_PAD.encode(thumbprint),
        })
    }

    pub fn from_pem_file(
        transport: Arc<HttpTransport>,
        authority_host: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        private_key_path: &Path,
        thumbprint_hex: &str,
    ) -> std::result::Result<Self, CredentialError> {
        let pem = std::fs::read(private_key_path).map_err(|source| CredentialError::ReadKey {
            path: private_key_path.display().to_string(),
            source,
        })?;
        Self::new(
            transport,
            authority_host,
            tenant_id,
            client_id,
            &pem,
            thumbprint_hex,
        )
    }

    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.tenant_id
        )
    }

    fn client_assertion(&self) -> std::result::Result<String, CredentialError> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            aud: self.token_endpoint(),
            iss: self.client_id.clone(),
            sub: self.client_id.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
            nbf: now,
            iat: now,
            exp: now + 600,
        };
        let header = Header {
            alg: Algorithm::RS256,
            x5t: Some(self.x5t.clone()),
            ..Default::default()
        };
        encode(&header, &claims, &self.key).map_err(CredentialError::Signing)
    }
}

#[async_trait]
impl TokenSource for CertificateCredential {
    #[instrument(skip(self), level = "debug", fields(tenant = %self.tenant_id))]
    async fn acquire(&self, scope: &str) -> Result<AcquiredToken> {
        let assertion = self.client_assertion()?;
        let request = self.transport.client().post(self.token_endpoint()).form(&[
            ("client_id", self.client_id.as_str()),
            ("scope", scope),
            ("grant_type", "client_credentials"),
            (
                "client_assertion_type",
                "urn:ietf:params:oauth:client-assertion-type:jwt-bearer",
            ),
            ("client_assertion", assertion.as_str()),
        ]);

        let resp = self
            .transport
            .send(Deadline::Request, request)
            .await
            .map_err(|e| match e {
                SyncError::Remote { status, body } => {
                    SyncError::Auth(format!("identity provider returned {status}: {body}"))
                }
                other => other,
            })?;

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: i64,
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| SyncError::Auth(format!("malformed token response: {e}")))?;

        Ok(AcquiredToken {
            access_token: token.access_token,
            expires_in: token.expires_in,
        })
    }
}
