/// Connection supervision state machine
///
/// Maintains one logical transport connection: detects liveness loss via
/// the heartbeat tracker and drives reconnection with bounded exponential
/// backoff. The machine is synchronous; timer and transport callbacks are
/// delivered as [`ConnectionEvent`]s carrying explicit timestamps, and the
/// machine answers with the [`ConnectionAction`]s the async driver must
/// perform.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::backoff::BackoffPolicy;
use super::heartbeat::HeartbeatTracker;

/// Lifecycle of one logical connection
///
/// Exactly one instance exists per connection and only the supervisor
/// mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No usable transport and no retry scheduled
    Disconnected,

    /// Transport open requested, link not yet usable
    Connecting,

    /// Link usable, heartbeat active
    Connected,

    /// A retry is armed and will fire after the backoff delay
    ReconnectPending,
}

impl ConnectionState {
    /// State name for logs and status reporting
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::ReconnectPending => "ReconnectPending",
        }
    }
}

/// Inputs to the supervisor
///
/// Events carry explicit timestamps so tests never need real timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Explicit connect request; also the only exit from terminal failure
    Connect,

    /// Transport reports the link became usable
    TransportUp(Instant),

    /// Transport reports loss of the link
    TransportDown,

    /// Transport reports a failure
    TransportError,

    /// Periodic heartbeat timer fired
    HeartbeatTick(Instant),

    /// A liveness probe was acknowledged
    HeartbeatAck(Instant),

    /// The scheduled reconnect delay elapsed
    RetryDelayElapsed,
}

/// Side effects the driver must execute, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open the transport with the current credential
    OpenTransport,

    /// Close and discard the existing transport handle
    TeardownTransport,

    /// Send a liveness probe over the transport
    SendProbe,

    /// Arm a one-shot retry timer
    ScheduleRetry(Duration),

    /// Attempt budget exhausted; surface a terminal status
    ReportTerminalFailure,
}

/// Supervisor for one transport connection
///
/// Owns the connection state, the backoff budget and the heartbeat
/// tracker. [`handle`](Self::handle) is the single dispatch point: it
/// mutates state synchronously and returns the actions to perform.
#[derive(Debug)]
pub struct ConnectionSupervisor {
    state: ConnectionState,
    backoff: BackoffPolicy,
    heartbeat: HeartbeatTracker,

    /// Ensures terminal failure is surfaced exactly once per exhaustion
    terminal_reported: bool,
}

impl ConnectionSupervisor {
    /// Create a supervisor in the `Disconnected` state
    pub fn new(backoff: BackoffPolicy, heartbeat: HeartbeatTracker) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            backoff,
            heartbeat,
            terminal_reported: false,
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts consumed since the last successful connection
    pub fn attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    /// Heartbeat tracker (read-only)
    pub fn heartbeat(&self) -> &HeartbeatTracker {
        &self.heartbeat
    }

    /// Whether outbound sends may be forwarded to the transport
    pub fn can_send(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Deliberately return to `Disconnected` without scheduling a retry
    ///
    /// Used when the transport is torn down on purpose (credential expiry,
    /// session shutdown); the next transition is an explicit `Connect`.
    pub fn disconnect(&mut self) {
        debug!(state = self.state.name(), "deliberate disconnect");
        self.state = ConnectionState::Disconnected;
        self.backoff.reset();
    }

    /// Process one event and return the actions to execute
    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<ConnectionAction> {
        match event {
            ConnectionEvent::Connect => self.on_connect(),
            ConnectionEvent::TransportUp(now) => self.on_transport_up(now),
            ConnectionEvent::TransportDown | ConnectionEvent::TransportError => {
                self.on_transport_down()
            }
            ConnectionEvent::HeartbeatTick(now) => self.on_heartbeat_tick(now),
            ConnectionEvent::HeartbeatAck(now) => {
                self.heartbeat.mark_ack(now);
                Vec::new()
            }
            ConnectionEvent::RetryDelayElapsed => self.on_retry_elapsed(),
        }
    }

    fn on_connect(&mut self) -> Vec<ConnectionAction> {
        match self.state {
            ConnectionState::Connected | ConnectionState::ReconnectPending => {
                debug!(state = self.state.name(), "connect request ignored");
                Vec::new()
            }
            _ => {
                self.state = ConnectionState::Connecting;
                info!("opening transport");
                vec![ConnectionAction::OpenTransport]
            }
        }
    }

    fn on_transport_up(&mut self, now: Instant) -> Vec<ConnectionAction> {
        self.backoff.reset();
        self.terminal_reported = false;
        self.heartbeat.mark_ack(now);
        self.state = ConnectionState::Connected;
        info!("transport up");
        Vec::new()
    }

    fn on_transport_down(&mut self) -> Vec<ConnectionAction> {
        if self.state == ConnectionState::ReconnectPending {
            // A retry is already armed; the dying link is torn down then.
            return Vec::new();
        }
        warn!(state = self.state.name(), "transport down");
        self.state = ConnectionState::Disconnected;
        self.reconnect()
    }

    fn on_heartbeat_tick(&mut self, now: Instant) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::Connected {
            return Vec::new();
        }
        if self.heartbeat.is_stale(now) {
            warn!("no heartbeat ack within timeout, reconnecting");
            self.state = ConnectionState::Disconnected;
            return self.reconnect();
        }
        vec![ConnectionAction::SendProbe]
    }

    fn on_retry_elapsed(&mut self) -> Vec<ConnectionAction> {
        if self.state != ConnectionState::ReconnectPending {
            return Vec::new();
        }
        self.state = ConnectionState::Connecting;
        info!(attempt = self.backoff.attempts(), "retrying connection");
        vec![
            ConnectionAction::TeardownTransport,
            ConnectionAction::OpenTransport,
        ]
    }

    fn reconnect(&mut self) -> Vec<ConnectionAction> {
        if self.state == ConnectionState::ReconnectPending {
            return Vec::new();
        }
        match self.backoff.next() {
            Some(delay) => {
                self.state = ConnectionState::ReconnectPending;
                info!(
                    attempt = self.backoff.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
                vec![ConnectionAction::ScheduleRetry(delay)]
            }
            None => {
                if self.terminal_reported {
                    return Vec::new();
                }
                self.terminal_reported = true;
                warn!("reconnect attempt budget exhausted");
                vec![ConnectionAction::ReportTerminalFailure]
            }
        }
    }
}

impl Default for ConnectionSupervisor {
    fn default() -> Self {
        Self::new(BackoffPolicy::connection(), HeartbeatTracker::default())
    }
}
