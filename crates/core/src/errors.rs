//! Error taxonomy shared by every command of the sync layer.

use thiserror::Error;

/// Result type alias for sync layer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], for callers that only need to pick
/// a user-facing reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Session expired or missing; the caller must re-authenticate.
    Auth,
    /// A unique field (BAN number, phone number) is already taken.
    Conflict,
    /// Rejected locally before reaching the server.
    Validation,
    /// No response from the server at all.
    Network,
    /// Any other server or decoding failure.
    Server,
}

/// Errors returned by mutation commands, the gateway and the session layer.
///
/// The store is never mutated when one of these is returned.
#[derive(Debug, Error)]
pub enum Error {
    /// Expired, invalid or missing session.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Duplicate unique field, reported by the server (HTTP 409) or by the
    /// local pre-check.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Client-side validation failure.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport failure, no response received.
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response or undecodable response body.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Local JSON serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Persisted session storage failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// A success response whose body could not be used.
    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::Api {
            status: 200,
            message: message.into(),
        }
    }

    /// HTTP status if this error came from a server response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Auth(_) => Some(401),
            Self::Conflict(_) => Some(409),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Network(_) => ErrorKind::Network,
            Self::Api { .. } | Self::Json(_) | Self::Storage(_) => ErrorKind::Server,
        }
    }

    /// Message suitable for showing to the person who issued the command.
    pub fn user_message(&self) -> String {
        match self {
            Self::Conflict(message) | Self::Validation(message) => message.clone(),
            Self::Auth(_) => "Session expired, please sign in again".to_string(),
            _ => "The operation could not be completed".to_string(),
        }
    }
}
