//! Error types for the gateway crate.

use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors that can occur while talking to the CRM API.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport failure; no response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request body could not be encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing session or HTTP 401.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// HTTP 409.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other non-2xx response, or an unreadable 2xx body.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid client configuration (base URL, token characters).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Persisting or clearing the session failed.
    #[error(transparent)]
    Session(crmsync_core::Error),
}

impl GatewayError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status if the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Conflict(_) => Some(409),
            _ => None,
        }
    }
}

impl From<GatewayError> for crmsync_core::Error {
    fn from(err: GatewayError) -> Self {
        use crmsync_core::Error;
        match err {
            GatewayError::Http(e) => Error::network(e.to_string()),
            GatewayError::Json(e) => Error::Json(e),
            GatewayError::Auth(message) => Error::auth(message),
            GatewayError::Conflict(message) => Error::conflict(message),
            GatewayError::Api { status, message } => Error::api(status, message),
            GatewayError::InvalidRequest(message) => Error::validation(message),
            GatewayError::Session(e) => e,
        }
    }
}
