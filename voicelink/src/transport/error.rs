/// Transport error types
///
/// This module defines error types used throughout the transport layer.

use thiserror::Error;

/// Transport-related errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to server
    #[error("Failed to connect to server: {0}")]
    ConnectionFailed(String),

    /// Authentication failed (invalid or expired credential)
    #[error("Authentication failed: credential rejected")]
    AuthenticationFailed,

    /// Connection timeout
    #[error("Connection timeout after {0}ms")]
    Timeout(u64),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to serialize message
    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to build HTTP request
    #[error("Failed to build HTTP request: {0}")]
    Http(String),

    /// The link is no longer open
    #[error("Transport link closed")]
    LinkClosed,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling exchange failed
    #[error("Signaling error: {0}")]
    Signaling(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

impl From<tokio_tungstenite::tungstenite::http::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::http::Error) -> Self {
        TransportError::Http(err.to_string())
    }
}
