/// Session error types

use thiserror::Error;

/// Failures sending one event to the server
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// No usable connection right now
    #[error("Not connected")]
    NotConnected,

    /// The transport rejected the event
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Session-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session driver has stopped
    #[error("Session is not running")]
    NotRunning,

    /// An outbound event could not be delivered
    #[error("Failed to send event: {0}")]
    Send(#[from] SendError),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
