//! Transport provider contract and the default websocket provider.
//!
//! A provider owns the actual network connection and reports everything that
//! happens on it through [`TransportSignal`]s. The adapter is
//! transport-agnostic: any implementation of [`TransportProvider`] can be
//! substituted, which is the crate's documented extension point.

use bytes::Bytes;
use futures_util::{SinkExt, Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, warn};

/// Production websocket endpoint for the transcription stream.
pub const STREAM_ENDPOINT: &str = "wss://stream.voxstream.io/v1/transcribe";
/// Local development websocket endpoint for the transcription stream.
pub const LOCAL_STREAM_ENDPOINT: &str = "ws://localhost:8082/v1/transcribe";

/// Connection target handed to a provider via `configure`.
#[derive(Clone, Debug)]
pub struct ConnectRequest {
    url: String,
    api_key: Option<SecretString>,
}

impl ConnectRequest {
    /// Creates a request for the given websocket endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            url: url.trim_end().to_string(),
            api_key: None,
        }
    }

    /// Attaches an api key sent as the `x-api-key` header.
    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Endpoint the provider should connect to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Api key for the connection, if any.
    pub fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref()
    }
}

/// Raw lifecycle signal emitted by a transport provider.
///
/// Signals for one transport instance must be emitted in the order the
/// underlying events occurred.
#[derive(Debug)]
pub enum TransportSignal {
    /// The connection opened successfully.
    Opened,
    /// The connection closed.
    Closed {
        code: u16,
        reason: String,
        was_clean: bool,
    },
    /// The connection failed; terminal for this transport instance.
    Failed(TransportError),
    /// A raw inbound frame arrived.
    Message(Bytes),
}

/// Errors produced by stream transport handling.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Websocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// API key could not be converted to a valid HTTP header value.
    #[error("invalid api-key header: {0}")]
    InvalidApiKeyHeader(#[from] InvalidHeaderValue),

    /// `connect` was requested before any `configure`.
    #[error("transport is not configured")]
    NotConfigured,

    /// `configure` or `connect` was requested while a connection is active.
    #[error("connection is active; disconnect first")]
    ConnectionActive,

    /// The transport instance reached a terminal status.
    #[error("transport instance is terminal; reconfigure before reconnecting")]
    ReconfigureRequired,

    /// Outbound payload queue has been closed.
    #[error("send queue is closed")]
    SendQueueClosed,

    /// Simulated failure armed on a test provider.
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Pluggable transport performing the actual network connection.
///
/// `bind` is called once by the adapter before any other method; all later
/// lifecycle activity is reported through the bound signal channel. The
/// remaining methods are fire-and-forget requests: failures surface as
/// [`TransportSignal::Failed`], not as return values.
pub trait TransportProvider: Send + 'static {
    /// Binds the channel all transport signals are emitted on.
    fn bind(&mut self, signals: mpsc::UnboundedSender<TransportSignal>);

    /// Points the provider at a new connection target.
    fn configure(&mut self, request: ConnectRequest) -> Result<(), TransportError>;

    /// Requests the transport open.
    fn connect(&mut self);

    /// Requests the transport close.
    fn disconnect(&mut self);

    /// Forwards a single binary payload unmodified.
    fn send(&mut self, payload: Bytes);
}

enum WorkerCommand {
    Send(Bytes),
    Close,
}

/// Default provider backed by `tokio-tungstenite`.
///
/// `connect` spawns a worker task that owns the socket; outbound payloads and
/// the close request travel to it over a command queue.
#[derive(Default)]
pub struct WebSocketProvider {
    request: Option<ConnectRequest>,
    signals: Option<mpsc::UnboundedSender<TransportSignal>>,
    commands: Option<mpsc::UnboundedSender<WorkerCommand>>,
}

impl WebSocketProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, signal: TransportSignal) {
        if let Some(signals) = &self.signals {
            let _ = signals.send(signal);
        }
    }
}

impl TransportProvider for WebSocketProvider {
    fn bind(&mut self, signals: mpsc::UnboundedSender<TransportSignal>) {
        self.signals = Some(signals);
    }

    fn configure(&mut self, request: ConnectRequest) -> Result<(), TransportError> {
        // Fail fast on an unusable endpoint or api key.
        build_client_request(&request)?;
        self.request = Some(request);
        self.commands = None;
        Ok(())
    }

    fn connect(&mut self) {
        let Some(signals) = self.signals.clone() else {
            return;
        };
        let Some(request) = self.request.clone() else {
            let _ = signals.send(TransportSignal::Failed(TransportError::NotConfigured));
            return;
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        self.commands = Some(command_tx);
        tokio::spawn(run_socket_worker(request, command_rx, signals));
    }

    fn disconnect(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(WorkerCommand::Close);
        }
    }

    fn send(&mut self, payload: Bytes) {
        let delivered = match &self.commands {
            Some(commands) => commands.send(WorkerCommand::Send(payload)).is_ok(),
            None => false,
        };
        if !delivered {
            warn!(event = "send_without_active_socket");
            self.emit(TransportSignal::Failed(TransportError::SendQueueClosed));
        }
    }
}

fn build_client_request(
    request: &ConnectRequest,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, TransportError> {
    let mut client_request = request.url().into_client_request()?;
    if let Some(api_key) = request.api_key() {
        let header_value = api_key.expose_secret().parse()?;
        client_request
            .headers_mut()
            .insert("x-api-key", header_value);
    }
    Ok(client_request)
}

async fn run_socket_worker(
    request: ConnectRequest,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    signals: mpsc::UnboundedSender<TransportSignal>,
) {
    let client_request = match build_client_request(&request) {
        Ok(client_request) => client_request,
        Err(err) => {
            let _ = signals.send(TransportSignal::Failed(err));
            return;
        }
    };

    let mut socket = match connect_async(client_request).await {
        Ok((socket, _)) => socket,
        Err(err) => {
            let _ = signals.send(TransportSignal::Failed(TransportError::WebSocket(err)));
            return;
        }
    };
    debug!(event = "socket_opened", url = request.url());
    let _ = signals.send(TransportSignal::Opened);

    loop {
        tokio::select! {
            maybe_command = commands.recv() => {
                match maybe_command {
                    Some(WorkerCommand::Send(payload)) => {
                        if let Err(err) = socket.send(Message::Binary(payload.to_vec())).await {
                            let _ = signals.send(TransportSignal::Failed(TransportError::WebSocket(err)));
                            return;
                        }
                    }
                    Some(WorkerCommand::Close) | None => {
                        let _ = socket.close(None).await;
                        let signal = await_close_ack(&mut socket).await;
                        debug!(event = "socket_closed_by_client");
                        let _ = signals.send(signal);
                        return;
                    }
                }
            }
            maybe_frame = socket.next() => {
                match maybe_frame {
                    Some(Ok(Message::Binary(payload))) => {
                        let _ = signals.send(TransportSignal::Message(Bytes::from(payload)));
                    }
                    Some(Ok(Message::Text(text))) => {
                        let _ = signals.send(TransportSignal::Message(Bytes::from(text.into_bytes())));
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(err) = socket.send(Message::Pong(payload)).await {
                            let _ = signals.send(TransportSignal::Failed(TransportError::WebSocket(err)));
                            return;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        debug!(event = "socket_closed_by_server");
                        let _ = signals.send(close_signal(frame, true));
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        let _ = signals.send(TransportSignal::Failed(TransportError::WebSocket(err)));
                        return;
                    }
                    None => {
                        let _ = signals.send(close_signal(None, false));
                        return;
                    }
                }
            }
        }
    }
}

/// Drains the socket after a client-initiated close until the peer acks.
async fn await_close_ack<S>(socket: &mut tokio_tungstenite::WebSocketStream<S>) -> TransportSignal
where
    tokio_tungstenite::WebSocketStream<S>: futures_util::Sink<Message, Error = WsError>
        + Stream<Item = Result<Message, WsError>>
        + Unpin,
{
    loop {
        match socket.next().await {
            Some(Ok(Message::Close(frame))) => return close_signal(frame, true),
            Some(Ok(_)) => {}
            Some(Err(WsError::ConnectionClosed)) | None => return close_signal(None, true),
            Some(Err(err)) => return TransportSignal::Failed(TransportError::WebSocket(err)),
        }
    }
}

fn close_signal(
    frame: Option<tokio_tungstenite::tungstenite::protocol::CloseFrame<'_>>,
    was_clean: bool,
) -> TransportSignal {
    match frame {
        Some(frame) => TransportSignal::Closed {
            code: u16::from(frame.code),
            reason: frame.reason.to_string(),
            was_clean,
        },
        None => TransportSignal::Closed {
            // 1005: no status code present on the wire.
            code: if was_clean { 1005 } else { 1006 },
            reason: String::new(),
            was_clean,
        },
    }
}
