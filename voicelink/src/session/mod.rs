/// Voice session management
///
/// Ties the supervision state machines, the transport, the credential
/// provider and the conversation history together into one long-running
/// session. The session owns a single driver task; the [`VoiceSession`]
/// handle talks to it over a command channel and observes status through
/// a lock-free snapshot plus a watch channel.
///
/// # Example
///
/// ```ignore
/// use voicelink::session::{SessionConfig, VoiceSession};
/// use voicelink::transport::{SocketConfig, SocketTransport};
/// use voicelink::credential::HttpTokenProvider;
///
/// let transport = SocketTransport::new(SocketConfig::new("wss://api.example.com/v1/realtime"));
/// let provider = HttpTokenProvider::new("https://backend.example.com/token");
///
/// let session = VoiceSession::start(transport, provider, SessionConfig::default(), |event| {
///     println!("server event: {:?}", event);
/// });
/// session.connect().await?;
/// ```

/// Session driver task
mod driver;
/// Session error types
pub mod error;

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::credential::TokenProvider;
use crate::history::MessageRecord;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::supervisor::{BackoffPolicy, ConnectionSupervisor, HeartbeatTracker, TokenRefreshSupervisor};
use crate::supervisor::heartbeat::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT};
use crate::transport::Transport;

use driver::Driver;

pub use error::{SendError, SessionError, SessionResult};

/// Commands accepted by the driver task
#[derive(Debug)]
pub(crate) enum Command {
    /// Open (or reopen after terminal failure) the connection
    Connect,

    /// Deliver one event to the server
    Send(ClientEvent, oneshot::Sender<Result<(), SendError>>),

    /// Snapshot the conversation history
    History(oneshot::Sender<Vec<MessageRecord>>),

    /// Tear everything down and exit the driver
    Shutdown,
}

/// Timing and retry configuration for one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Heartbeat probe interval
    pub heartbeat_interval: Duration,

    /// Silence tolerance before the link is declared stale
    pub heartbeat_timeout: Duration,

    /// Base delay for reconnect backoff
    pub connect_base_delay: Duration,

    /// Cap on the reconnect backoff delay
    pub connect_max_delay: Duration,

    /// Reconnect attempt budget
    pub connect_max_attempts: u32,

    /// Base delay for credential refresh retries
    pub refresh_base_delay: Duration,

    /// Cap on the credential refresh retry delay
    pub refresh_max_delay: Duration,

    /// Credential refresh attempt budget
    pub refresh_max_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            connect_base_delay: Duration::from_millis(1000),
            connect_max_delay: Duration::from_millis(10_000),
            connect_max_attempts: 5,
            refresh_base_delay: Duration::from_millis(1000),
            refresh_max_delay: Duration::from_millis(30_000),
            refresh_max_attempts: 5,
        }
    }
}

impl SessionConfig {
    /// Set heartbeat probe interval and silence tolerance
    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    /// Set the reconnect backoff schedule
    pub fn with_connect_backoff(
        mut self,
        base_delay: Duration,
        max_delay: Duration,
        max_attempts: u32,
    ) -> Self {
        self.connect_base_delay = base_delay;
        self.connect_max_delay = max_delay;
        self.connect_max_attempts = max_attempts;
        self
    }

    /// Set the credential refresh retry schedule
    pub fn with_refresh_backoff(
        mut self,
        base_delay: Duration,
        max_delay: Duration,
        max_attempts: u32,
    ) -> Self {
        self.refresh_base_delay = base_delay;
        self.refresh_max_delay = max_delay;
        self.refresh_max_attempts = max_attempts;
        self
    }

    pub(crate) fn connection_supervisor(&self) -> ConnectionSupervisor {
        ConnectionSupervisor::new(
            BackoffPolicy::new(
                self.connect_base_delay,
                self.connect_max_delay,
                self.connect_max_attempts,
            ),
            HeartbeatTracker::new(self.heartbeat_interval, self.heartbeat_timeout),
        )
    }

    pub(crate) fn refresh_supervisor(&self) -> TokenRefreshSupervisor {
        TokenRefreshSupervisor::new(BackoffPolicy::new(
            self.refresh_base_delay,
            self.refresh_max_delay,
            self.refresh_max_attempts,
        ))
    }
}

/// User-visible session status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Not connected and not trying to be
    Idle,

    /// Opening the first connection
    Connecting,

    /// Link up and healthy
    Connected,

    /// Link lost; a retry is scheduled
    Reconnecting {
        /// Reconnect attempt number (1-based)
        attempt: u32,
    },

    /// Reconnect budget exhausted; requires an explicit reconnect
    ConnectionFailed,

    /// Credential refresh budget exhausted; requires a manual restart
    CredentialExpired,
}

impl SessionStatus {
    /// Short status name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Reconnecting { .. } => "Reconnecting",
            Self::ConnectionFailed => "ConnectionFailed",
            Self::CredentialExpired => "CredentialExpired",
        }
    }

    /// Message suitable for direct display to the user
    pub fn message(&self) -> &'static str {
        match self {
            Self::Idle => "Disconnected",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Reconnecting { .. } => "Disconnected - Attempting to reconnect...",
            Self::ConnectionFailed => "Connection failed - Please refresh",
            Self::CredentialExpired => "Connection expired. Please restart manually.",
        }
    }

    /// Whether this status requires explicit user action to leave
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ConnectionFailed | Self::CredentialExpired)
    }
}

/// Handle to a running voice session
///
/// Cheap to query; all mutation happens on the driver task. Dropping the
/// handle shuts the driver down.
pub struct VoiceSession {
    command_tx: mpsc::Sender<Command>,
    status: Arc<ArcSwap<SessionStatus>>,
    status_rx: watch::Receiver<SessionStatus>,
    driver: Option<JoinHandle<()>>,
}

impl VoiceSession {
    /// Start the session driver
    ///
    /// The session begins idle; call [`connect`](Self::connect) to open
    /// the connection. `on_event` is invoked on the driver task for every
    /// decoded server event except heartbeat acknowledgments.
    pub fn start<T, P, F>(transport: T, provider: P, config: SessionConfig, on_event: F) -> Self
    where
        T: Transport,
        P: TokenProvider,
        F: FnMut(ServerEvent) + Send + 'static,
    {
        info!("Starting voice session");

        let (command_tx, command_rx) = mpsc::channel(32);
        let status = Arc::new(ArcSwap::from_pointee(SessionStatus::Idle));
        let (status_tx, status_rx) = watch::channel(SessionStatus::Idle);

        let driver = Driver::new(
            transport,
            provider,
            config,
            on_event,
            command_rx,
            Arc::clone(&status),
            status_tx,
        );
        let handle = tokio::spawn(driver.run());

        Self {
            command_tx,
            status,
            status_rx,
            driver: Some(handle),
        }
    }

    /// Request a connection
    ///
    /// Also the way out of a terminal [`SessionStatus::ConnectionFailed`]
    /// or [`SessionStatus::CredentialExpired`] state.
    pub async fn connect(&self) -> SessionResult<()> {
        self.command_tx
            .send(Command::Connect)
            .await
            .map_err(|_| SessionError::NotRunning)
    }

    /// Send one event to the server
    ///
    /// Fails with [`SendError::NotConnected`] unless the session is
    /// currently connected; events are never queued across outages.
    pub async fn send(&self, event: ClientEvent) -> SessionResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Send(event, reply_tx))
            .await
            .map_err(|_| SessionError::NotRunning)?;
        let outcome = reply_rx.await.map_err(|_| SessionError::NotRunning)?;
        outcome.map_err(SessionError::Send)
    }

    /// Current status snapshot
    pub fn status(&self) -> SessionStatus {
        self.status.load().as_ref().clone()
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    /// Snapshot the conversation history
    pub async fn history(&self) -> SessionResult<Vec<MessageRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::History(reply_tx))
            .await
            .map_err(|_| SessionError::NotRunning)?;
        reply_rx.await.map_err(|_| SessionError::NotRunning)
    }

    /// Shut the session down and wait for the driver to exit
    pub async fn stop(mut self) {
        info!("Stopping voice session");
        let _ = self.command_tx.send(Command::Shutdown).await;
        if let Some(handle) = self.driver.take() {
            if let Err(e) = handle.await {
                warn!("Driver task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if self.driver.is_some() {
            let _ = self.command_tx.try_send(Command::Shutdown);
        }
    }
}
