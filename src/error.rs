//! Error types for content access

use thiserror::Error;

/// Errors raised while talking to the content repository or handling its data
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure (connection, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The content API answered with a non-success status
    #[error("content API returned {status} for {url}")]
    Status { status: u16, url: String },

    /// The response body did not match the expected document shape
    #[error("invalid response from content API: {0}")]
    Decode(#[from] serde_json::Error),

    /// A pagination cursor that does not point at the configured repository
    #[error("invalid pagination cursor: {0}")]
    InvalidCursor(String),

    /// The API root did not advertise a master ref
    #[error("no master ref advertised by {0}")]
    MissingRef(String),

    /// Preview token was empty or rejected by the repository
    #[error("invalid preview token")]
    InvalidPreviewToken,

    /// Malformed endpoint or cursor URL
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Whether the content API reported that the requested ref is unknown
    pub fn is_rejected_ref(&self) -> bool {
        matches!(self, Error::Status { status, .. } if *status == 400 || *status == 404)
    }
}

/// Result alias for content operations
pub type Result<T> = std::result::Result<T, Error>;
