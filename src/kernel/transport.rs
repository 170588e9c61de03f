use crate::core::config::StreamConfig;
use crate::core::errors::StreamError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, Secret};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{instrument, warn};

/// Where a session dials to. Built fresh per `connect()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
        }
    }
}

/// Raw bidirectional text transport - pure byte plumbing, no protocol
/// knowledge. Chunk boundaries carry no meaning; the framer upstairs
/// reassembles lines.
#[async_trait]
pub trait Transport: Send {
    /// Connect to the remote endpoint.
    async fn connect(&mut self) -> Result<(), StreamError>;

    /// Write one raw text chunk.
    async fn send_raw(&mut self, text: &str) -> Result<(), StreamError>;

    /// Receive the next raw chunk. `None` means the peer closed the stream.
    async fn next_raw(&mut self) -> Option<Result<String, StreamError>>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), StreamError>;

    /// Check if the connection is alive.
    fn is_connected(&self) -> bool;
}

/// Creates a fresh, unconnected transport per connection attempt, keyed by
/// host/port/tls plus whatever session options the factory carries.
pub trait TransportFactory: Send + Sync {
    type Transport: Transport + Send + 'static;

    fn create(&self, endpoint: &Endpoint) -> Self::Transport;
}

/// Tungstenite-based transport implementation
pub struct TungsteniteTransport {
    url: String,
    write: Option<
        futures_util::stream::SplitSink<
            tokio_tungstenite::WebSocketStream<
                tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
            >,
            Message,
        >,
    >,
    read: Option<
        futures_util::stream::SplitStream<
            tokio_tungstenite::WebSocketStream<
                tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
            >,
        >,
    >,
    connected: bool,
    connect_timeout: Duration,
}

impl TungsteniteTransport {
    pub fn new(url: String, connect_timeout: Duration) -> Self {
        Self {
            url,
            write: None,
            read: None,
            connected: false,
            connect_timeout,
        }
    }
}

#[async_trait]
impl Transport for TungsteniteTransport {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&mut self) -> Result<(), StreamError> {
        let connection_future = tokio::time::timeout(self.connect_timeout, connect_async(&self.url));

        let (ws_stream, _) = connection_future
            .await
            .map_err(|_| StreamError::ConnectionTimeout("connection timeout".to_string()))?
            .map_err(|e| StreamError::NetworkError(format!("connection failed: {}", e)))?;

        let (write, read) = ws_stream.split();
        self.write = Some(write);
        self.read = Some(read);
        self.connected = true;

        Ok(())
    }

    async fn send_raw(&mut self, text: &str) -> Result<(), StreamError> {
        if !self.connected {
            return Err(StreamError::NotConnected);
        }

        let write = self
            .write
            .as_mut()
            .ok_or_else(|| StreamError::NetworkError("write stream not available".to_string()))?;

        write.send(Message::Text(text.to_string())).await.map_err(|e| {
            self.connected = false;
            StreamError::NetworkError(format!("failed to send message: {}", e))
        })?;

        Ok(())
    }

    async fn next_raw(&mut self) -> Option<Result<String, StreamError>> {
        loop {
            if !self.connected {
                return None;
            }

            let read = self.read.as_mut()?;

            match read.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                Some(Ok(Message::Binary(data))) => {
                    return Some(String::from_utf8(data).map_err(|e| {
                        StreamError::NetworkError(format!("invalid utf-8 in binary frame: {}", e))
                    }))
                }
                Some(Ok(Message::Ping(data))) => {
                    // Auto-respond to pings at transport level
                    if let Some(write) = self.write.as_mut() {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!("Failed to send pong response: {}", e);
                        }
                    }
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    self.connected = false;
                    return None;
                }
                Some(Err(e)) => {
                    self.connected = false;
                    return Some(Err(StreamError::NetworkError(format!(
                        "websocket error: {}",
                        e
                    ))));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        if let Some(write) = self.write.as_mut() {
            let _ = write.send(Message::Close(None)).await;
        }
        self.connected = false;
        self.write = None;
        self.read = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Default factory: builds `ws://` / `wss://` URLs from the endpoint and the
/// stream options, appending the session token as a query parameter.
pub struct WsTransportFactory {
    path: String,
    token: Option<Secret<String>>,
    connect_timeout: Duration,
}

impl WsTransportFactory {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            path: config.path.clone(),
            token: config.token.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }

    fn url_for(&self, endpoint: &Endpoint) -> String {
        let scheme = if endpoint.tls { "wss" } else { "ws" };
        let mut url = format!("{}://{}:{}{}", scheme, endpoint.host, endpoint.port, self.path);
        if let Some(token) = &self.token {
            url.push_str("?token=");
            url.push_str(token.expose_secret());
        }
        url
    }
}

impl TransportFactory for WsTransportFactory {
    type Transport = TungsteniteTransport;

    fn create(&self, endpoint: &Endpoint) -> TungsteniteTransport {
        TungsteniteTransport::new(self.url_for(endpoint), self.connect_timeout)
    }
}
