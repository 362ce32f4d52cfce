/// Heartbeat liveness tracking
///
/// Detects silent transport death: a probe is sent on a fixed interval
/// and the connection is treated as stale when no acknowledgment has
/// arrived within the timeout, regardless of what the transport reports.

use std::time::{Duration, Instant};

/// Default probe interval
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(2000);

/// Default silence tolerance before the link is declared stale
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Tracks acknowledgment recency for one connection
#[derive(Debug, Clone)]
pub struct HeartbeatTracker {
    /// How often a probe is sent
    interval: Duration,

    /// Silence tolerance after the last acknowledgment
    timeout: Duration,

    /// When the last acknowledgment arrived
    last_ack: Instant,
}

impl HeartbeatTracker {
    /// Create a tracker with explicit timing
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            last_ack: Instant::now(),
        }
    }

    /// Probe interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Silence tolerance
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record an acknowledgment
    pub fn mark_ack(&mut self, now: Instant) {
        self.last_ack = now;
    }

    /// Whether the link should be treated as dead
    pub fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_ack) > self.timeout
    }
}

impl Default for HeartbeatTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT)
    }
}
