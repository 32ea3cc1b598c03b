//! Error taxonomy shared by every synchronisation component.

/// Errors surfaced by token acquisition, remote calls and reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid library url: {0}")]
    InvalidUrl(String),

    #[error("Remote API returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Expected exactly one content type named '{name}', found {count}")]
    AmbiguousContentType { name: String, count: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// HTTP status of a remote failure, if this error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
