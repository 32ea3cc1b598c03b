//! SharePoint backend for spsync.
//!
//! Bearer tokens come from a per-tenant `TokenManager`; Graph and legacy REST
//! calls share one pooled `HttpTransport`. `SharePointBackend` implements
//! `spsync_core::ListBackend`, so the reconciliation engine runs unchanged
//! against a live tenant.

pub mod backend;
pub mod client;
pub mod config;
pub mod graph;
pub mod rest;
pub mod token_manager;
pub mod transfer;
pub mod transport;

pub use backend::SharePointBackend;
pub use client::SharePointClient;
pub use graph::{ApiVersion, GraphClient, PageMode, PagedResult, RequestOptions, ResolvedList};
pub use rest::RestClient;
pub use token_manager::{
    AcquiredToken, CertificateCredential, MemoryTokenStore, TokenManager, TokenSource, TokenStore,
};
pub use transfer::{download, download_to_path, should_convert_to_pdf, upload, UploadOutcome};
pub use transport::{HttpTransport, TransportConfig};
