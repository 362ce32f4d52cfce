/// Session driver task
///
/// Single owner of all mutable session state. The driver multiplexes the
/// command channel, transport events and the three timers (heartbeat,
/// reconnect retry, credential refresh) through one `select!` loop and
/// feeds the supervision state machines, executing whatever actions they
/// return. Dropping the transport event receiver detaches a dying link,
/// so events from a replaced transport can never reach the machines.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant as TokioInstant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::credential::{Credential, CredentialRequest, CredentialResult, TokenProvider};
use crate::history::ConversationHistory;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::supervisor::{
    ConnectionAction, ConnectionEvent, ConnectionState, ConnectionSupervisor, RefreshAction,
    TokenRefreshSupervisor,
};
use crate::transport::{Transport, TransportEvent, TransportSink};

use super::{Command, SendError, SessionConfig, SessionStatus};

/// Timestamp for machine events; goes through the tokio clock so paused
/// test time is observed
fn now() -> Instant {
    TokioInstant::now().into_std()
}

/// What woke the driver loop up
enum Wake {
    Command(Option<Command>),
    Transport(Option<TransportEvent>),
    Heartbeat,
    Retry,
    Refresh,
}

pub(crate) struct Driver<T: Transport, P, F> {
    transport: T,
    provider: P,
    on_event: F,

    connection: ConnectionSupervisor,
    refresh: TokenRefreshSupervisor,
    history: ConversationHistory,
    credential: Option<Credential>,

    /// Outbound half of the current link, if one is open
    sink: Option<T::Sink>,

    /// Inbound events from the current link; `None` fences stale links
    transport_rx: Option<mpsc::Receiver<TransportEvent>>,

    command_rx: mpsc::Receiver<Command>,
    status: Arc<ArcSwap<SessionStatus>>,
    status_tx: watch::Sender<SessionStatus>,

    config: SessionConfig,
    retry_deadline: Option<TokioInstant>,
    refresh_deadline: Option<TokioInstant>,
}

impl<T, P, F> Driver<T, P, F>
where
    T: Transport,
    P: TokenProvider,
    F: FnMut(ServerEvent) + Send + 'static,
{
    pub(crate) fn new(
        transport: T,
        provider: P,
        config: SessionConfig,
        on_event: F,
        command_rx: mpsc::Receiver<Command>,
        status: Arc<ArcSwap<SessionStatus>>,
        status_tx: watch::Sender<SessionStatus>,
    ) -> Self {
        Self {
            transport,
            provider,
            on_event,
            connection: config.connection_supervisor(),
            refresh: config.refresh_supervisor(),
            history: ConversationHistory::new(),
            credential: None,
            sink: None,
            transport_rx: None,
            command_rx,
            status,
            status_tx,
            config,
            retry_deadline: None,
            refresh_deadline: None,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Session driver started");

        let mut heartbeat = time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = tokio::select! {
                command = self.command_rx.recv() => Wake::Command(command),
                event = recv_opt(&mut self.transport_rx) => Wake::Transport(event),
                _ = heartbeat.tick() => Wake::Heartbeat,
                _ = sleep_until_opt(self.retry_deadline) => Wake::Retry,
                _ = sleep_until_opt(self.refresh_deadline) => Wake::Refresh,
            };

            match wake {
                Wake::Command(None) | Wake::Command(Some(Command::Shutdown)) => break,
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Transport(Some(event)) => self.handle_transport_event(event).await,
                Wake::Transport(None) => {
                    // Reader task gone without a Down event.
                    self.transport_rx = None;
                    self.dispatch_connection(ConnectionEvent::TransportDown).await;
                }
                Wake::Heartbeat => {
                    self.dispatch_connection(ConnectionEvent::HeartbeatTick(now()))
                        .await;
                }
                Wake::Retry => {
                    self.retry_deadline = None;
                    self.dispatch_connection(ConnectionEvent::RetryDelayElapsed).await;
                }
                Wake::Refresh => {
                    self.refresh_deadline = None;
                    let actions = self.refresh.refresh_tick();
                    let follow_ups = self.apply_refresh_actions(actions).await;
                    for event in follow_ups {
                        self.dispatch_connection(event).await;
                    }
                }
            }
        }

        self.shutdown().await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                if self.connection.state() == ConnectionState::Disconnected {
                    self.set_status(SessionStatus::Connecting);
                }
                self.dispatch_connection(ConnectionEvent::Connect).await;
            }
            Command::Send(event, reply) => {
                let outcome = self.send_event(&event).await;
                let _ = reply.send(outcome);
            }
            Command::History(reply) => {
                let _ = reply.send(self.history.records().to_vec());
            }
            // Handled by the run loop.
            Command::Shutdown => {}
        }
    }

    async fn send_event(&mut self, event: &ClientEvent) -> Result<(), SendError> {
        if !self.connection.can_send() {
            return Err(SendError::NotConnected);
        }
        let Some(sink) = self.sink.as_mut() else {
            return Err(SendError::NotConnected);
        };
        match sink.send(event).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Outbound send failed: {}", e);
                let message = e.to_string();
                self.dispatch_connection(ConnectionEvent::TransportError).await;
                Err(SendError::Transport(message))
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Up => {
                self.dispatch_connection(ConnectionEvent::TransportUp(now()))
                    .await;
                self.set_status(SessionStatus::Connected);

                // Every fresh link restarts the refresh schedule for the
                // credential that opened it.
                if let Some(expires_in) = self.credential.as_ref().map(Credential::expires_in) {
                    let actions = self.refresh.start(expires_in);
                    let follow_ups = self.apply_refresh_actions(actions).await;
                    for event in follow_ups {
                        self.dispatch_connection(event).await;
                    }
                }
            }
            TransportEvent::Down => {
                self.sink = None;
                self.transport_rx = None;
                self.dispatch_connection(ConnectionEvent::TransportDown).await;
            }
            TransportEvent::Error(e) => {
                warn!("Transport error: {}", e);
                self.dispatch_connection(ConnectionEvent::TransportError).await;
            }
            TransportEvent::Message(event) => {
                if event.is_pong() {
                    self.dispatch_connection(ConnectionEvent::HeartbeatAck(now()))
                        .await;
                    return;
                }
                if let ServerEvent::Error { error } = &event {
                    warn!(
                        "Server error event: {}",
                        error.message.as_deref().unwrap_or("unknown")
                    );
                }
                self.history.record(&event);
                (self.on_event)(event);
            }
        }
    }

    /// Feed one event into the connection machine and execute the
    /// resulting actions; follow-up events (e.g. a failed open) are fed
    /// back in until the machine settles.
    async fn dispatch_connection(&mut self, event: ConnectionEvent) {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            for action in self.connection.handle(event) {
                match action {
                    ConnectionAction::OpenTransport => {
                        if let Some(follow_up) = self.open_transport().await {
                            pending.push_back(follow_up);
                        }
                    }
                    ConnectionAction::TeardownTransport => {
                        self.teardown_transport().await;
                    }
                    ConnectionAction::SendProbe => {
                        if let Some(sink) = self.sink.as_mut() {
                            if let Err(e) = sink.send(&ClientEvent::Ping).await {
                                warn!("Heartbeat probe failed: {}", e);
                                pending.push_back(ConnectionEvent::TransportError);
                            }
                        }
                    }
                    ConnectionAction::ScheduleRetry(delay) => {
                        self.retry_deadline = Some(TokioInstant::now() + delay);
                        self.set_status(SessionStatus::Reconnecting {
                            attempt: self.connection.attempts(),
                        });
                    }
                    ConnectionAction::ReportTerminalFailure => {
                        self.teardown_transport().await;
                        for action in self.refresh.stop() {
                            if matches!(action, RefreshAction::CancelTimer) {
                                self.refresh_deadline = None;
                            }
                        }
                        self.set_status(SessionStatus::ConnectionFailed);
                    }
                }
            }
        }
    }

    /// Execute refresh machine actions; returns connection events the
    /// caller must dispatch (the two machines never call into each other
    /// directly).
    async fn apply_refresh_actions(&mut self, actions: Vec<RefreshAction>) -> Vec<ConnectionEvent> {
        let mut queue: VecDeque<RefreshAction> = actions.into();
        let mut follow_ups = Vec::new();

        while let Some(action) = queue.pop_front() {
            match action {
                RefreshAction::ScheduleRecurring(interval) => {
                    self.refresh_deadline = Some(TokioInstant::now() + interval);
                }
                RefreshAction::ScheduleRetry(delay) => {
                    self.refresh_deadline = Some(TokioInstant::now() + delay);
                }
                RefreshAction::CancelTimer => {
                    self.refresh_deadline = None;
                }
                RefreshAction::RefreshCredential(generation) => {
                    match self.fetch_credential().await {
                        Ok(credential) => {
                            self.credential = Some(credential);
                            queue.extend(self.refresh.refresh_succeeded(generation));
                        }
                        Err(e) => {
                            warn!("Credential refresh failed: {}", e);
                            queue.extend(self.refresh.refresh_failed(generation));
                        }
                    }
                }
                RefreshAction::ReplaceTransport => {
                    // Silent swap: the old link dies without going through
                    // the reconnect path, the new one comes up as usual.
                    info!("Replacing transport with refreshed credential");
                    self.teardown_transport().await;
                    if let Some(follow_up) = self.open_transport().await {
                        follow_ups.push(follow_up);
                    }
                }
                RefreshAction::ReportTerminalFailure => {
                    self.teardown_transport().await;
                    self.connection.disconnect();
                    self.retry_deadline = None;
                    self.set_status(SessionStatus::CredentialExpired);
                }
            }
        }

        follow_ups
    }

    /// Open a fresh link, fetching a credential first if the held one is
    /// missing or expired. Returns the event to feed the connection
    /// machine on failure; success is reported by the link itself.
    async fn open_transport(&mut self) -> Option<ConnectionEvent> {
        let needs_fetch = match self.credential.as_ref() {
            Some(credential) => credential.is_expired(now()),
            None => true,
        };
        if needs_fetch {
            match self.fetch_credential().await {
                Ok(credential) => self.credential = Some(credential),
                Err(e) => {
                    warn!("Credential fetch failed: {}", e);
                    return Some(ConnectionEvent::TransportError);
                }
            }
        }

        let Some(credential) = self.credential.clone() else {
            return Some(ConnectionEvent::TransportError);
        };

        match self.transport.open(&credential).await {
            Ok((sink, event_rx)) => {
                self.sink = Some(sink);
                self.transport_rx = Some(event_rx);
                None
            }
            Err(e) => {
                warn!("Transport open failed: {}", e);
                Some(ConnectionEvent::TransportError)
            }
        }
    }

    async fn teardown_transport(&mut self) {
        // Dropping the receiver first fences off anything the dying link
        // still has in flight.
        self.transport_rx = None;
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close().await {
                debug!("Error closing transport: {}", e);
            }
        }
    }

    async fn fetch_credential(&mut self) -> CredentialResult<Credential> {
        let request = CredentialRequest {
            session_id: self.history.session_id().map(str::to_string),
            conversation_id: self.history.conversation_id().map(str::to_string),
            conversation_history: self.history.records().to_vec(),
        };
        self.provider.fetch(&request).await
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status.load().as_ref() == &status {
            return;
        }
        info!(status = status.name(), "session status changed");
        self.status.store(Arc::new(status.clone()));
        let _ = self.status_tx.send(status);
    }

    async fn shutdown(&mut self) {
        info!("Session driver shutting down");
        for action in self.refresh.stop() {
            if matches!(action, RefreshAction::CancelTimer) {
                self.refresh_deadline = None;
            }
        }
        self.teardown_transport().await;
        self.connection.disconnect();
        self.history.clear();
        self.set_status(SessionStatus::Idle);
    }
}

async fn recv_opt(rx: &mut Option<mpsc::Receiver<TransportEvent>>) -> Option<TransportEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<TokioInstant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
