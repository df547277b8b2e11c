//! Streaming transport adapter.
//!
//! [`StreamAdapter`] bridges a [`TransportProvider`]'s raw signals to a
//! normalized subscriber interface. A single pump task drains the provider's
//! signal channel, decodes inbound frames, and forwards notices onto the
//! registered subscriber lane; a consumer task owns the subscriber and drains
//! the lane in order. Subscribers are therefore never invoked from inside a
//! transport callback.

use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::stream::proto::{DecodeError, EventDecoder, JsonEventDecoder, TranscriptEvent};
use crate::stream::provider::{
    ConnectRequest, TransportError, TransportProvider, TransportSignal,
};

/// Connection lifecycle status reported to subscribers.
///
/// `Closed` and `Unknown` are terminal for a transport instance; a new
/// connection requires reconfiguring the adapter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Closed,
    Unknown,
}

impl ConnectionStatus {
    /// Whether this status ends the current transport instance.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionStatus::Closed | ConnectionStatus::Unknown)
    }
}

/// Connection status change delivered to a subscriber.
#[derive(Debug)]
pub struct StatusNotice {
    pub status: ConnectionStatus,
    /// Populated only on failure paths; `None` on clean opens and closes.
    pub error: Option<TransportError>,
}

/// Decoded-event arrival delivered to a subscriber.
///
/// Exactly one of `event` and `decode_error` is populated.
#[derive(Debug)]
pub struct EventNotice {
    pub event: Option<TranscriptEvent>,
    pub decode_error: Option<DecodeError>,
}

/// Consumer of normalized stream notifications.
///
/// Both methods are invoked from a dedicated consumer task, in the order the
/// underlying transport events occurred for one transport instance.
pub trait StreamSubscriber: Send + 'static {
    fn connection_status_changed(&mut self, notice: StatusNotice);
    fn event_received(&mut self, notice: EventNotice);
}

enum Notice {
    Status(StatusNotice),
    Event(EventNotice),
}

type SubscriberLane = Arc<RwLock<Option<mpsc::UnboundedSender<Notice>>>>;

/// Bridges a pluggable transport provider to a stream subscriber.
pub struct StreamAdapter {
    provider: Box<dyn TransportProvider>,
    lane: SubscriberLane,
    status: Arc<RwLock<ConnectionStatus>>,
    configured: bool,
    connect_requested: bool,
}

impl StreamAdapter {
    /// Creates an adapter over `provider` with the default JSON decoder.
    ///
    /// Must be called within a Tokio runtime; the adapter spawns its signal
    /// pump task immediately.
    pub fn new(provider: impl TransportProvider) -> Self {
        Self::with_decoder(provider, JsonEventDecoder)
    }

    /// Creates an adapter over `provider` with an explicit event decoder.
    pub fn with_decoder(provider: impl TransportProvider, decoder: impl EventDecoder) -> Self {
        let mut provider = Box::new(provider);
        let lane: SubscriberLane = Arc::new(RwLock::new(None));
        let status = Arc::new(RwLock::new(ConnectionStatus::Connecting));

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        provider.bind(signal_tx);
        tokio::spawn(pump_signals(
            signal_rx,
            Arc::new(decoder),
            Arc::clone(&lane),
            Arc::clone(&status),
        ));

        Self {
            provider,
            lane,
            status,
            configured: false,
            connect_requested: false,
        }
    }

    /// Registers the subscriber all notifications are delivered to.
    ///
    /// Replaces any previous subscriber atomically: transport signals arriving
    /// after this call are never delivered to the old subscriber. Ownership of
    /// `subscriber` moves to a spawned consumer task, which ends when the
    /// subscriber is replaced and its lane drains.
    pub fn set_subscriber(&self, subscriber: impl StreamSubscriber) {
        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut subscriber = subscriber;
            while let Some(notice) = notice_rx.recv().await {
                match notice {
                    Notice::Status(notice) => subscriber.connection_status_changed(notice),
                    Notice::Event(notice) => subscriber.event_received(notice),
                }
            }
        });
        if let Ok(mut lane) = self.lane.write() {
            *lane = Some(notice_tx);
        }
    }

    /// Rebinds the adapter to a new transport instance.
    ///
    /// Fails with [`TransportError::ConnectionActive`] while a previously
    /// requested connection has not reached a terminal status.
    pub fn configure(&mut self, request: ConnectRequest) -> Result<(), TransportError> {
        if self.connect_requested && !self.status().is_terminal() {
            return Err(TransportError::ConnectionActive);
        }
        self.provider.configure(request)?;
        self.configured = true;
        self.connect_requested = false;
        if let Ok(mut status) = self.status.write() {
            *status = ConnectionStatus::Connecting;
        }
        Ok(())
    }

    /// Requests the transport open.
    ///
    /// On success the subscriber observes `Connected` exactly once; transport
    /// failures surface as an `Unknown` status notice carrying the error.
    /// Once the instance has reached a terminal status — however it got
    /// there — reconnecting requires `configure` first.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        if !self.configured {
            return Err(TransportError::NotConfigured);
        }
        if self.status().is_terminal() {
            return Err(TransportError::ReconfigureRequired);
        }
        if self.connect_requested {
            return Err(TransportError::ConnectionActive);
        }
        self.connect_requested = true;
        self.provider.connect();
        Ok(())
    }

    /// Requests the transport close; the subscriber observes `Closed` once.
    pub fn disconnect(&mut self) {
        self.provider.disconnect();
    }

    /// Forwards one binary payload to the transport unmodified.
    ///
    /// At-most-once per call; failures are reported through the provider's
    /// failure signal, not as a return value.
    pub fn send(&mut self, payload: Bytes) {
        self.provider.send(payload);
    }

    /// Latest known connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
            .read()
            .map(|status| *status)
            .unwrap_or(ConnectionStatus::Unknown)
    }
}

async fn pump_signals(
    mut signals: mpsc::UnboundedReceiver<TransportSignal>,
    decoder: Arc<dyn EventDecoder>,
    lane: SubscriberLane,
    status: Arc<RwLock<ConnectionStatus>>,
) {
    while let Some(signal) = signals.recv().await {
        let notice = match signal {
            TransportSignal::Opened => {
                record_status(&status, ConnectionStatus::Connected);
                Notice::Status(StatusNotice {
                    status: ConnectionStatus::Connected,
                    error: None,
                })
            }
            TransportSignal::Closed {
                code,
                reason,
                was_clean,
            } => {
                debug!(event = "transport_closed", code, reason, was_clean);
                record_status(&status, ConnectionStatus::Closed);
                Notice::Status(StatusNotice {
                    status: ConnectionStatus::Closed,
                    error: None,
                })
            }
            TransportSignal::Failed(err) => {
                warn!(event = "transport_failed", error = %err);
                record_status(&status, ConnectionStatus::Unknown);
                Notice::Status(StatusNotice {
                    status: ConnectionStatus::Unknown,
                    error: Some(err),
                })
            }
            TransportSignal::Message(raw) => match decoder.decode(&raw) {
                Ok(event) => Notice::Event(EventNotice {
                    event: Some(event),
                    decode_error: None,
                }),
                Err(err) => {
                    warn!(event = "frame_decode_failed", error = %err, len = raw.len());
                    Notice::Event(EventNotice {
                        event: None,
                        decode_error: Some(err),
                    })
                }
            },
        };

        if let Ok(lane) = lane.read() {
            if let Some(subscriber) = lane.as_ref() {
                let _ = subscriber.send(notice);
            }
        }
    }
}

fn record_status(status: &Arc<RwLock<ConnectionStatus>>, next: ConnectionStatus) {
    if let Ok(mut status) = status.write() {
        *status = next;
    }
}

/// Subscriber that forwards notices onto plain channels.
///
/// For callers that prefer awaiting receivers over implementing
/// [`StreamSubscriber`].
pub struct ChannelSubscriber {
    status_tx: mpsc::UnboundedSender<StatusNotice>,
    event_tx: mpsc::UnboundedSender<EventNotice>,
}

impl ChannelSubscriber {
    /// Creates the subscriber plus the receivers notices arrive on.
    pub fn channel() -> (
        Self,
        mpsc::UnboundedReceiver<StatusNotice>,
        mpsc::UnboundedReceiver<EventNotice>,
    ) {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                status_tx,
                event_tx,
            },
            status_rx,
            event_rx,
        )
    }
}

impl StreamSubscriber for ChannelSubscriber {
    fn connection_status_changed(&mut self, notice: StatusNotice) {
        let _ = self.status_tx.send(notice);
    }

    fn event_received(&mut self, notice: EventNotice) {
        let _ = self.event_tx.send(notice);
    }
}
