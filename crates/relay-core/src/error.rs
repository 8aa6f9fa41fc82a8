//! Error types for the relay core

use thiserror::Error;

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Main error type for the relay core
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level failures (connect, timeout, dropped connection).
    /// These are the only errors eligible for retry.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Application-level errors returned by an upstream provider
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The session does not exist or does not belong to the caller
    #[error("Session {session_id} not found for user {user_id}")]
    SessionNotFound { user_id: String, session_id: i64 },

    /// No provider registered under the requested name
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Durable storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Request timed out
    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

impl RelayError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new upstream error
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// Create a new storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a session-not-found error
    pub fn session_not_found(user_id: impl Into<String>, session_id: i64) -> Self {
        Self::SessionNotFound {
            user_id: user_id.into(),
            session_id,
        }
    }

    /// Whether the error is transient and worth retrying.
    ///
    /// Only transport-level failures qualify; application errors embedded
    /// in a provider response never do.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            Self::Transport(error.to_string())
        } else if error.is_status() || error.is_decode() {
            Self::Upstream(error.to_string())
        } else {
            // Request build/body failures before a response counts as transport
            Self::Transport(error.to_string())
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}
