//! Duplex session transport.
//!
//! A [`Transport`] owns exactly one socket connection. It never retries and
//! never queues frames for a connection that is not open yet: anything sent
//! while the channel is down is dropped, so stale keystrokes cannot replay
//! into a fresh connection.
//!
//! Lifecycle events are not returned from calls. They are posted as
//! [`TransportEvent`]s, tagged with the transport's [`Generation`], to a
//! channel owned by the session manager.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use protocol::error::{ProtocolError, Result};
use protocol::{decode_incoming, EndpointParams, Frame, Incoming};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tokio_util::sync::CancellationToken;

use crate::endpoint::EndpointBuilder;

/// Default timeout for the socket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tag identifying one transport instance.
///
/// Each connection attempt gets a strictly larger generation than the one
/// before it, so events from a superseded transport can be recognized and
/// discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    /// Wraps a raw generation number.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the next generation.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw generation number.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// The channel is open and frames may be sent.
    Open,
    /// A structured frame arrived.
    Frame(Frame),
    /// Unstructured text arrived; it belongs on the terminal as-is.
    Raw(String),
    /// Socket-level failure.
    Error(String),
    /// The channel closed.
    Close {
        /// WebSocket close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
}

/// An event tagged with the generation of the transport that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Generation of the emitting transport.
    pub generation: Generation,
    /// The event itself.
    pub kind: TransportEventKind,
}

impl TransportEvent {
    /// Creates a new event.
    pub fn new(generation: Generation, kind: TransportEventKind) -> Self {
        Self { generation, kind }
    }
}

/// Sender half of the channel transports post their events to.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// One live duplex connection.
pub trait Transport: Send {
    /// Generation this transport was opened with.
    fn generation(&self) -> Generation;

    /// Whether frames can currently be sent.
    fn is_open(&self) -> bool;

    /// Encodes and writes a frame.
    ///
    /// Returns false if the frame was dropped because the channel is not
    /// open. Dropped frames are never queued.
    fn send(&self, frame: &Frame) -> bool;

    /// Tears the connection down. Calling this more than once is a no-op.
    fn close(&mut self);
}

/// Opens transports.
///
/// Opening only starts the connection; completion, incoming frames and
/// failures are posted to `events`.
pub trait TransportConnector: Send + Sync {
    /// Begins connecting to the endpoint described by `params`.
    fn open(
        &self,
        params: &EndpointParams,
        generation: Generation,
        events: EventSender,
    ) -> Result<Box<dyn Transport>>;
}

/// Opens [`WebSocketTransport`]s through an [`EndpointBuilder`].
pub struct WebSocketConnector {
    builder: Arc<dyn EndpointBuilder>,
    auth_token: Option<String>,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Creates a connector that resolves endpoints with `builder`.
    pub fn new(builder: Arc<dyn EndpointBuilder>) -> Self {
        Self {
            builder,
            auth_token: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sends `token` as a bearer `Authorization` header on every handshake.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Sets the handshake timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn request(&self, params: &EndpointParams) -> Result<Request> {
        let url = self.builder.build(params)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ProtocolError::InvalidEndpoint(format!("{}: {}", url, e)))?;

        if let Some(ref token) = self.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                ProtocolError::InvalidEndpoint(format!("invalid auth token: {}", e))
            })?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        Ok(request)
    }
}

impl TransportConnector for WebSocketConnector {
    fn open(
        &self,
        params: &EndpointParams,
        generation: Generation,
        events: EventSender,
    ) -> Result<Box<dyn Transport>> {
        let runtime = Handle::try_current().map_err(|e| {
            ProtocolError::Transport(format!("no async runtime available: {}", e))
        })?;
        let request = self.request(params)?;
        tracing::debug!(
            generation = %generation,
            uri = %request.uri(),
            "Opening session socket"
        );
        Ok(Box::new(WebSocketTransport::spawn(
            &runtime,
            request,
            generation,
            events,
            self.connect_timeout,
        )))
    }
}

/// WebSocket-backed transport.
///
/// A background task performs the handshake and then pumps frames in both
/// directions until the socket ends or [`Transport::close`] is called.
pub struct WebSocketTransport {
    generation: Generation,
    open: Arc<AtomicBool>,
    outgoing: mpsc::UnboundedSender<WsMessage>,
    cancel: CancellationToken,
    closed: bool,
}

impl WebSocketTransport {
    fn spawn(
        runtime: &Handle,
        request: Request,
        generation: Generation,
        events: EventSender,
        connect_timeout: Duration,
    ) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let task = SocketTask {
            generation,
            events,
            open: open.clone(),
            cancel: cancel.clone(),
        };
        runtime.spawn(task.run(request, outgoing_rx, connect_timeout));

        Self {
            generation,
            open,
            outgoing: outgoing_tx,
            cancel,
            closed: false,
        }
    }
}

impl Transport for WebSocketTransport {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn is_open(&self) -> bool {
        !self.closed && self.open.load(Ordering::SeqCst)
    }

    fn send(&self, frame: &Frame) -> bool {
        if !self.is_open() {
            tracing::debug!(
                generation = %self.generation,
                kind = frame.kind(),
                "Dropping frame, channel not open"
            );
            return false;
        }

        let json = match frame.encode() {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(generation = %self.generation, error = %e, "Failed to encode frame");
                return false;
            }
        };

        if self.outgoing.send(WsMessage::Text(json)).is_err() {
            tracing::debug!(
                generation = %self.generation,
                kind = frame.kind(),
                "Dropping frame, socket task has exited"
            );
            return false;
        }
        true
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.open.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        tracing::debug!(generation = %self.generation, "Session socket closed");
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// State owned by the background socket task.
struct SocketTask {
    generation: Generation,
    events: EventSender,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl SocketTask {
    /// Posts an event unless the transport has been closed locally.
    fn emit(&self, kind: TransportEventKind) {
        if self.cancel.is_cancelled() {
            return;
        }
        if self
            .events
            .send(TransportEvent::new(self.generation, kind))
            .is_err()
        {
            tracing::trace!(generation = %self.generation, "Event receiver dropped");
        }
    }

    fn fail(&self, err: ProtocolError) {
        self.open.store(false, Ordering::SeqCst);
        self.emit(TransportEventKind::Error(err.to_string()));
    }

    fn closed(&self, code: Option<u16>, reason: String) {
        self.open.store(false, Ordering::SeqCst);
        self.emit(TransportEventKind::Close { code, reason });
    }

    async fn run(
        self,
        request: Request,
        mut outgoing_rx: mpsc::UnboundedReceiver<WsMessage>,
        connect_timeout: Duration,
    ) {
        let handshake = tokio::time::timeout(connect_timeout, connect_async(request));
        let ws_stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(generation = %self.generation, "Socket cancelled before open");
                return;
            }
            result = handshake => match result {
                Ok(Ok((stream, _response))) => stream,
                Ok(Err(e)) => {
                    tracing::warn!(generation = %self.generation, error = %e, "Session socket handshake failed");
                    self.fail(ws_error(e));
                    return;
                }
                Err(_) => {
                    tracing::warn!(generation = %self.generation, "Session socket handshake timed out");
                    self.fail(ProtocolError::Timeout("connection timed out".to_string()));
                    return;
                }
            }
        };

        self.open.store(true, Ordering::SeqCst);
        self.emit(TransportEventKind::Open);

        let (mut ws_sink, mut ws_rx) = ws_stream.split();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    let _ = ws_sink.send(WsMessage::Close(None)).await;
                    break;
                }
                Some(msg) = outgoing_rx.recv() => {
                    if let Err(e) = ws_sink.send(msg).await {
                        tracing::warn!(generation = %self.generation, error = %e, "Failed to write to session socket");
                        self.fail(ws_error(e));
                        break;
                    }
                }
                incoming = ws_rx.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => self.dispatch(&text),
                    Some(Ok(WsMessage::Binary(bytes))) => {
                        self.emit(TransportEventKind::Raw(
                            String::from_utf8_lossy(&bytes).into_owned(),
                        ));
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                            None => (None, String::new()),
                        };
                        tracing::debug!(generation = %self.generation, ?code, %reason, "Server closed session socket");
                        self.closed(code, reason);
                        break;
                    }
                    // Ping/pong are answered by tungstenite.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(generation = %self.generation, error = %e, "Session socket read error");
                        self.fail(ws_error(e));
                        break;
                    }
                    None => {
                        self.closed(None, "stream ended".to_string());
                        break;
                    }
                }
            }
        }

        self.open.store(false, Ordering::SeqCst);
    }

    fn dispatch(&self, text: &str) {
        match decode_incoming(text) {
            Incoming::Frame(frame) => self.emit(TransportEventKind::Frame(frame)),
            Incoming::Raw(text) => self.emit(TransportEventKind::Raw(text)),
            Incoming::Unknown(reason) => {
                tracing::debug!(
                    generation = %self.generation,
                    %reason,
                    "Ignoring unrecognized session message"
                );
            }
        }
    }
}

fn ws_error(err: WsError) -> ProtocolError {
    match err {
        WsError::Io(io_err) => ProtocolError::from(io_err),
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            ProtocolError::ConnectionClosed(err.to_string())
        }
        other => ProtocolError::Transport(other.to_string()),
    }
}
