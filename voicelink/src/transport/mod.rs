/// Transport layer for the realtime session
///
/// Abstracts the underlying link (WebSocket today, with an SDP signaling
/// helper for media setup) behind a capability seam: the session driver
/// only sees an event stream and an outbound sink, so supervision logic
/// stays independent of the wire.

/// Transport error types
pub mod error;
/// SDP offer/answer exchange over HTTPS
pub mod signaling;
/// WebSocket transport
pub mod socket;

use std::future::Future;

use tokio::sync::mpsc;

use crate::credential::Credential;
use crate::protocol::{ClientEvent, ServerEvent};

pub use error::{TransportError, TransportResult};
pub use signaling::{SignalingClient, SignalingConfig};
pub use socket::{SocketConfig, SocketSink, SocketTransport};

/// What a live link reports back to its supervisor
#[derive(Debug)]
pub enum TransportEvent {
    /// The link is established and ready to carry traffic
    Up,

    /// The link ended (close frame, stream end, or after an error)
    Down,

    /// The link failed; a `Down` follows
    Error(TransportError),

    /// A decoded inbound server event
    Message(ServerEvent),
}

/// Outbound half of an open link
pub trait TransportSink: Send + 'static {
    /// Send one event to the server
    fn send(&mut self, event: &ClientEvent) -> impl Future<Output = TransportResult<()>> + Send;

    /// Close the link gracefully
    fn close(&mut self) -> impl Future<Output = TransportResult<()>> + Send;
}

/// Capability to open links on demand
///
/// Each call to `open` establishes a fresh link authorized by the given
/// credential, returning the outbound sink and a channel of inbound
/// events. Dropping the receiver detaches the link's reader task, so a
/// supervisor can fence off a stale link by simply dropping its channel.
pub trait Transport: Send + 'static {
    /// Outbound half produced by `open`
    type Sink: TransportSink;

    /// Open a fresh link
    fn open(
        &mut self,
        credential: &Credential,
    ) -> impl Future<Output = TransportResult<(Self::Sink, mpsc::Receiver<TransportEvent>)>> + Send;
}
