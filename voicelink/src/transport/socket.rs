/// WebSocket transport for the realtime voice API
///
/// This module provides the WebSocket implementation of [`Transport`]:
/// `open` performs the authenticated upgrade handshake, splits the stream,
/// and spawns a reader task that decodes inbound frames into
/// [`TransportEvent`]s on a channel.

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        http::{Request, Uri},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::credential::Credential;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::transport::error::{TransportError, TransportResult};
use crate::transport::{Transport, TransportEvent, TransportSink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Inbound events buffered before the supervisor picks them up
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Configuration for the WebSocket transport
///
/// # Example
/// ```no_run
/// use voicelink::transport::SocketConfig;
///
/// let config = SocketConfig::new("wss://api.example.com/v1/realtime")
///     .with_model("gpt-realtime")
///     .with_timeout(5000);
/// ```
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Base WebSocket URL (ws:// or wss://)
    pub url: String,

    /// Model to request, appended as a query parameter
    pub model: Option<String>,

    /// Connection timeout in milliseconds
    pub timeout_ms: u64,
}

impl SocketConfig {
    /// Create a configuration for the given endpoint URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: None,
            timeout_ms: 10000, // 10 seconds default
        }
    }

    /// Set the model query parameter
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set connection timeout in milliseconds
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Build the WebSocket URL with query parameters
    pub fn build_url(&self) -> TransportResult<String> {
        if !self.url.starts_with("wss://") && !self.url.starts_with("ws://") {
            return Err(TransportError::InvalidConfig(format!(
                "WebSocket URL must use ws:// or wss://: {}",
                self.url
            )));
        }

        let mut url = self.url.clone();
        if let Some(ref model) = self.model {
            let separator = if url.contains('?') { '&' } else { '?' };
            url.push_str(&format!("{}model={}", separator, model));
        }

        Ok(url)
    }
}

/// WebSocket implementation of [`Transport`]
#[derive(Debug, Clone)]
pub struct SocketTransport {
    config: SocketConfig,
}

impl SocketTransport {
    /// Create a transport for the given configuration
    pub fn new(config: SocketConfig) -> Self {
        Self { config }
    }
}

impl Transport for SocketTransport {
    type Sink = SocketSink;

    async fn open(
        &mut self,
        credential: &Credential,
    ) -> TransportResult<(SocketSink, mpsc::Receiver<TransportEvent>)> {
        info!("Opening WebSocket link");

        let url = self.config.build_url()?;
        debug!("Connection URL: {}", url);

        let uri: Uri = url
            .parse()
            .map_err(|e| TransportError::InvalidConfig(format!("Invalid URL: {}", e)))?;
        let host = uri
            .host()
            .ok_or_else(|| TransportError::InvalidConfig("URL has no host".to_string()))?
            .to_string();

        // Build request with the bearer credential
        let request = Request::builder()
            .uri(uri)
            .header("Authorization", format!("Bearer {}", credential.value()))
            .header("Host", host)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .body(())
            .map_err(|e| TransportError::Http(e.to_string()))?;

        // Connect with timeout
        let connect_future = connect_async(request);
        let timeout = tokio::time::Duration::from_millis(self.config.timeout_ms);

        let (ws_stream, response) = tokio::time::timeout(timeout, connect_future)
            .await
            .map_err(|_| TransportError::Timeout(self.config.timeout_ms))?
            .map_err(|e| {
                if let tokio_tungstenite::tungstenite::Error::Http(resp) = &e {
                    if resp.status() == 401 {
                        return TransportError::AuthenticationFailed;
                    }
                }
                TransportError::ConnectionFailed(e.to_string())
            })?;

        info!("WebSocket link open (status: {})", response.status());

        let (writer, reader) = ws_stream.split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        // The link is up as soon as the handshake completes; queue the Up
        // event ahead of anything the reader task produces.
        event_tx
            .send(TransportEvent::Up)
            .await
            .map_err(|_| TransportError::LinkClosed)?;

        tokio::spawn(reader_task(reader, event_tx));

        Ok((
            SocketSink {
                writer,
                is_open: true,
            },
            event_rx,
        ))
    }
}

/// Outbound half of an open WebSocket link
#[derive(Debug)]
pub struct SocketSink {
    writer: WsWriter,
    is_open: bool,
}

impl TransportSink for SocketSink {
    async fn send(&mut self, event: &ClientEvent) -> TransportResult<()> {
        if !self.is_open {
            return Err(TransportError::LinkClosed);
        }

        let json = serde_json::to_string(event)?;
        debug!("Sending event: {}", json);

        self.writer
            .send(Message::Text(json.into()))
            .await
            .map_err(TransportError::WebSocket)?;

        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        if !self.is_open {
            return Ok(());
        }

        info!("Closing WebSocket link");
        self.is_open = false;

        self.writer
            .close()
            .await
            .map_err(TransportError::WebSocket)?;

        Ok(())
    }
}

/// Reader task that decodes inbound frames and forwards them as events
///
/// Runs until the stream ends, the link errors, or the event receiver is
/// dropped. Always finishes with a `Down` event (preceded by `Error` when
/// the stream failed).
async fn reader_task(mut reader: WsReader, event_tx: mpsc::Sender<TransportEvent>) {
    info!("Reader task started");

    let mut message_count = 0u64;

    while let Some(frame) = reader.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                debug!("Received text frame: {} bytes", text.len());

                match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => {
                        message_count += 1;
                        if event_tx.send(TransportEvent::Message(event)).await.is_err() {
                            debug!("Event receiver dropped, detaching reader");
                            return;
                        }
                    }
                    Err(e) => {
                        // Malformed frames are dropped, not fatal.
                        warn!("Discarding undecodable frame: {}", e);
                    }
                }
            }
            Ok(Message::Close(frame)) => {
                info!("Received close frame: {:?}", frame);
                break;
            }
            Ok(Message::Ping(data)) => {
                debug!("Received ping, length: {} bytes", data.len());
                // Pong is handled automatically by the underlying library
            }
            Ok(Message::Pong(_)) => {
                debug!("Received pong frame");
            }
            Ok(msg) => {
                warn!("Received unexpected frame type: {:?}", msg);
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                let _ = event_tx
                    .send(TransportEvent::Error(TransportError::WebSocket(e)))
                    .await;
                break;
            }
        }
    }

    info!(
        "Reader task completed: {} events forwarded, stream ended",
        message_count
    );

    let _ = event_tx.send(TransportEvent::Down).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_config_new() {
        let config = SocketConfig::new("wss://api.example.com/v1/realtime");

        assert_eq!(config.url, "wss://api.example.com/v1/realtime");
        assert_eq!(config.model, None);
        assert_eq!(config.timeout_ms, 10000);
    }

    #[test]
    fn test_socket_config_builder() {
        let config = SocketConfig::new("wss://api.example.com/v1/realtime")
            .with_model("gpt-realtime")
            .with_timeout(5000);

        assert_eq!(config.model, Some("gpt-realtime".to_string()));
        assert_eq!(config.timeout_ms, 5000);
    }

    #[test]
    fn test_socket_config_build_url() {
        let config = SocketConfig::new("wss://api.example.com/v1/realtime");
        assert_eq!(
            config.build_url().unwrap(),
            "wss://api.example.com/v1/realtime"
        );

        let config = config.with_model("gpt-realtime");
        assert_eq!(
            config.build_url().unwrap(),
            "wss://api.example.com/v1/realtime?model=gpt-realtime"
        );
    }

    #[test]
    fn test_socket_config_build_url_appends_to_existing_query() {
        let config =
            SocketConfig::new("wss://api.example.com/v1/realtime?intent=voice").with_model("m1");

        assert_eq!(
            config.build_url().unwrap(),
            "wss://api.example.com/v1/realtime?intent=voice&model=m1"
        );
    }

    #[test]
    fn test_socket_config_rejects_non_websocket_url() {
        let config = SocketConfig::new("https://api.example.com/v1/realtime");

        assert!(matches!(
            config.build_url(),
            Err(TransportError::InvalidConfig(_))
        ));
    }
}
