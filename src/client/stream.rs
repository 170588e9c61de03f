use crate::client::channel::RequestChannel;
use crate::core::config::{AccountType, StreamConfig};
use crate::core::errors::StreamError;
use crate::core::types::StreamEvent;
use crate::kernel::framer::LineFramer;
use crate::kernel::transport::{Endpoint, Transport, TransportFactory};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_retry::strategy::FixedInterval;
use tracing::{error, instrument, warn};

/// Connection lifecycle: Closed -> Connecting -> Open -> Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Closed,
    Connecting,
    Open,
}

/// Fixed handshake frame. Bypasses normal id assignment with the `null` id;
/// its reply is the only message ever consumed off the raw transport rather
/// than through the channel's dispatch.
const HANDSHAKE_FRAME: &str = concat!(
    r#"{"method":"server.version","params":[],"id":null}"#,
    "\n"
);

/// One persistent session against a trading-engine server.
///
/// Owns the transport lifecycle and at most one `RequestChannel`, which is
/// constructed after the version handshake and torn down with the session.
/// At most one session is open per instance; a second `connect()` while open
/// is a usage error. After `disconnect()` the instance is reusable - the
/// factory builds a fresh transport per attempt.
pub struct SessionStream<F: TransportFactory> {
    config: StreamConfig,
    factory: F,
    state: SessionState,
    sequence: u64,
    version: Option<String>,
    endpoint: Option<Endpoint>,
    channel: Option<Arc<RequestChannel>>,
    connected: Arc<AtomicBool>,
    user_id: Option<u64>,
    events_tx: mpsc::UnboundedSender<StreamEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<StreamEvent>>,
    io_task: Option<JoinHandle<()>>,
}

impl<F: TransportFactory> SessionStream<F> {
    pub fn new(config: StreamConfig, factory: F) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            config,
            factory,
            state: SessionState::Closed,
            sequence: 0,
            version: None,
            endpoint: None,
            channel: None,
            connected: Arc::new(AtomicBool::new(false)),
            user_id: None,
            events_tx,
            events_rx: Some(events_rx),
            io_task: None,
        }
    }

    /// Takes the event receiver. Yields `None` after the first call; there
    /// is exactly one consumer.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<StreamEvent>> {
        self.events_rx.take()
    }

    /// Opens the transport, performs the version handshake, and wires up a
    /// fresh `RequestChannel`. Resolves with the negotiated server version.
    ///
    /// A transport failure before the handshake completes tears the session
    /// down and fails the call; after that point transport failures surface
    /// as `Logout` events instead.
    #[instrument(skip(self), fields(host = %host, port = port, tls = tls))]
    pub async fn connect(&mut self, host: &str, port: u16, tls: bool) -> Result<String, StreamError> {
        if self.state != SessionState::Closed {
            return Err(StreamError::AlreadyConnected);
        }
        self.state = SessionState::Connecting;
        self.sequence += 1;

        let endpoint = Endpoint::new(host, port, tls);
        let mut transport = self.factory.create(&endpoint);
        self.endpoint = Some(endpoint);

        if let Err(e) = transport.connect().await {
            self.state = SessionState::Closed;
            let _ = self.events_tx.send(StreamEvent::TransportError(e.to_string()));
            return Err(e);
        }

        let mut framer = LineFramer::new(self.config.buffer_limit);
        let (version, leftovers) = match self.handshake(&mut transport, &mut framer).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let _ = transport.close().await;
                self.state = SessionState::Closed;
                let _ = self.events_tx.send(StreamEvent::TransportError(e.to_string()));
                return Err(e);
            }
        };

        self.state = SessionState::Open;
        self.connected.store(true, Ordering::SeqCst);
        self.version = Some(version.clone());

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let channel = Arc::new(RequestChannel::new(
            outbound_tx,
            framer,
            Arc::clone(&self.connected),
            self.events_tx.clone(),
            Duration::from_millis(self.config.reply_timeout_ms),
        ));
        self.channel = Some(Arc::clone(&channel));

        // Lines that arrived in the same chunk as the handshake reply.
        for line in leftovers {
            channel.dispatch_line(&line);
        }

        self.io_task = Some(tokio::spawn(run_io(
            transport,
            outbound_rx,
            Arc::clone(&channel),
            Arc::clone(&self.connected),
            self.events_tx.clone(),
        )));

        let _ = self.events_tx.send(StreamEvent::Connected {
            version: version.clone(),
        });

        Ok(version)
    }

    /// Performs the `server.version` exchange directly on the raw transport.
    /// The channel does not exist as a request/response participant yet, so
    /// the reply is read with a dedicated one-shot loop.
    async fn handshake(
        &self,
        transport: &mut F::Transport,
        framer: &mut LineFramer,
    ) -> Result<(String, Vec<String>), StreamError> {
        transport.send_raw(HANDSHAKE_FRAME).await?;

        let deadline = Duration::from_millis(self.config.handshake_timeout_ms);
        tokio::time::timeout(deadline, async {
            loop {
                match transport.next_raw().await {
                    Some(Ok(chunk)) => {
                        let mut lines: VecDeque<String> = framer.push(&chunk).into();
                        while let Some(line) = lines.pop_front() {
                            let json: Value = match serde_json::from_str(&line) {
                                Ok(json) => json,
                                Err(_) => {
                                    error!("Parse stream failed, data: {}", line.trim());
                                    continue;
                                }
                            };

                            if let Some(err) = json.get("error") {
                                if !err.is_null() {
                                    return Err(StreamError::HandshakeError(err.to_string()));
                                }
                            }

                            if let Some(result) = json.get("result") {
                                let version = result
                                    .as_str()
                                    .map_or_else(|| result.to_string(), str::to_string);
                                return Ok((version, lines.into_iter().collect()));
                            }
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(StreamError::HandshakeError(
                            "connection closed during handshake".to_string(),
                        ))
                    }
                }
            }
        })
        .await
        .map_err(|_| StreamError::ConnectionTimeout("handshake timeout".to_string()))?
    }

    /// Tears the session down: aborts the I/O task and drops the channel.
    /// The stream is immediately reusable for a subsequent `connect()`.
    #[instrument(skip(self))]
    pub fn disconnect(&mut self) -> Result<(), StreamError> {
        if self.state == SessionState::Closed {
            return Err(StreamError::NotConnected);
        }
        self.state = SessionState::Closed;
        self.connected.store(false, Ordering::SeqCst);

        if let Some(task) = self.io_task.take() {
            task.abort();
        }
        self.channel = None;

        Ok(())
    }

    /// Re-dials the last endpoint, waiting the configured delay between
    /// attempts. Reconnection is never attempted automatically; this is the
    /// explicit policy hook for consumers that want it.
    pub async fn reconnect(&mut self) -> Result<String, StreamError> {
        let endpoint = self.endpoint.clone().ok_or(StreamError::NotConnected)?;
        let retries = FixedInterval::from_millis(self.config.reconnect_delay_ms)
            .take(self.config.max_reconnect_attempts as usize);

        let mut last = StreamError::NotConnected;
        for delay in retries {
            tokio::time::sleep(delay).await;
            match self.connect(&endpoint.host, endpoint.port, endpoint.tls).await {
                Ok(version) => return Ok(version),
                Err(e @ StreamError::AlreadyConnected) => return Err(e),
                Err(e) => {
                    warn!("Reconnection attempt failed: {}", e);
                    last = e;
                }
            }
        }

        Err(last)
    }

    /// Clears the authenticated user and closes the session.
    pub fn logout(&mut self) -> Result<(), StreamError> {
        self.user_id = None;
        self.disconnect()
    }

    /// The channel for issuing requests; `None` until `connect()` resolves.
    pub fn channel(&self) -> Option<&Arc<RequestChannel>> {
        self.channel.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_auth(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn is_real(&self) -> bool {
        self.config.account == AccountType::Real
    }

    /// Marks the session authenticated (or not) after an auth exchange.
    pub fn set_user_id(&mut self, user_id: Option<u64>) {
        self.user_id = user_id;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of connect attempts over this instance's lifetime.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Server version negotiated at the last successful handshake.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

/// Single I/O task per session: the only writer and the only reader of the
/// transport, so inbound chunks are framed strictly in arrival order.
async fn run_io<T: Transport>(
    mut transport: T,
    mut outbound: mpsc::UnboundedReceiver<String>,
    channel: Arc<RequestChannel>,
    connected: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<StreamEvent>,
) {
    loop {
        tokio::select! {
            line = outbound.recv() => match line {
                Some(line) => {
                    if let Err(e) = transport.send_raw(&line).await {
                        error!("Transport write failed: {}", e);
                        connected.store(false, Ordering::SeqCst);
                        let _ = events.send(StreamEvent::Logout);
                        break;
                    }
                }
                None => break,
            },
            chunk = transport.next_raw() => match chunk {
                Some(Ok(chunk)) => channel.ingest(&chunk),
                Some(Err(e)) => {
                    // After the handshake a transport fault means the peer
                    // invalidated us, not that the connect failed.
                    error!("Transport error after session open: {}", e);
                    connected.store(false, Ordering::SeqCst);
                    let _ = events.send(StreamEvent::Logout);
                    break;
                }
                None => {
                    connected.store(false, Ordering::SeqCst);
                    let _ = events.send(StreamEvent::Disconnected);
                    break;
                }
            },
        }
    }
}
