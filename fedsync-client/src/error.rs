//! Error types for remote instance calls.

use thiserror::Error;

/// Result type for remote instance calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur when talking to a sharing instance.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The instance could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The key was not accepted.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The key is valid but lacks the privilege for the call.
    #[error("permission denied: {0}")]
    Forbidden(String),

    /// The instance refused the request (duplicate, validation failure).
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The addressed entity does not exist or is not visible to the key.
    #[error("not found: {0}")]
    NotFound(String),

    /// The response did not have the expected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// True if the instance refused a creation, typically because the entity
    /// already exists. Callers fall back to a lookup on this error.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ClientError::Rejected { .. })
    }

    /// True if the addressed entity is absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            ClientError::NotFound(_) => true,
            ClientError::Http(e) => e.status().is_some_and(|s| s.as_u16() == 404),
            _ => false,
        }
    }
}
