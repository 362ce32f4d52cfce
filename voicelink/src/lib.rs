/// Credential issuance and lifecycle
pub mod credential;

/// Conversation history tracking
pub mod history;

/// Tagged realtime event protocol
pub mod protocol;

/// Session lifecycle and public API
pub mod session;

/// Reconnection and credential-refresh state machines
pub mod supervisor;

/// Transport collaborators
pub mod transport;

/// Utility modules
pub mod utils;
