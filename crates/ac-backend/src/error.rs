use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport failure: connect, DNS/TLS, or reading the body.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success status. `message` comes from the body's `detail` or
    /// `message` field, or the status line.
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Body stream failure not originating from reqwest.
    #[error("stream error: {0}")]
    Stream(String),
}

impl BackendError {
    /// HTTP status for protocol errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
