/// Connection resilience core
///
/// This module holds the two supervisors that keep a realtime session
/// alive: one maintains the transport connection (heartbeat liveness,
/// reconnect with bounded exponential backoff), the other keeps a
/// short-lived credential valid for the life of the session. Both are
/// pure state machines driven by explicit events, so their timing
/// behavior is testable without real timers.

/// Exponential backoff schedule
pub mod backoff;

/// Connection state machine
pub mod connection;

/// Heartbeat liveness tracking
pub mod heartbeat;

/// Credential refresh state machine
pub mod token;

// Re-export commonly used types
pub use backoff::BackoffPolicy;
pub use connection::{ConnectionAction, ConnectionEvent, ConnectionState, ConnectionSupervisor};
pub use heartbeat::HeartbeatTracker;
pub use token::{RefreshAction, TokenRefreshSupervisor};
