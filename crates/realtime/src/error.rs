//! Error types for the realtime crate.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result type alias for realtime channel operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;

#[derive(Debug, Error)]
pub enum RealtimeError {
    /// WebSocket transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Frame that does not follow Engine.IO / Socket.IO framing.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered the namespace connect with a connect error.
    #[error("Connection refused: {0}")]
    Refused(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// The server closed the connection.
    #[error("Connection closed by server")]
    Closed,

    #[error("Invalid socket URL: {0}")]
    InvalidUrl(String),

    /// `restart()` was called while the previous task is still alive.
    #[error("Channel is already running")]
    AlreadyRunning,
}

impl RealtimeError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }
}

impl From<RealtimeError> for crmsync_core::Error {
    fn from(err: RealtimeError) -> Self {
        use crmsync_core::Error;
        match err {
            RealtimeError::Refused(message) => Error::auth(message),
            RealtimeError::InvalidUrl(message) => Error::validation(message),
            RealtimeError::AlreadyRunning => Error::validation(err.to_string()),
            RealtimeError::Json(e) => Error::Json(e),
            other => Error::network(other.to_string()),
        }
    }
}
