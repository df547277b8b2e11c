//! Test-support transport provider.
//!
//! [`MockTransportProvider`] is a scriptable [`TransportProvider`] for
//! exercising subscribers without a network: connects succeed or fail on
//! demand, outbound payloads are captured, and inbound frames can be
//! injected. Clones share state, so keep a clone to drive the mock after
//! handing it to an adapter.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::stream::provider::{
    ConnectRequest, TransportError, TransportProvider, TransportSignal,
};

#[derive(Default)]
struct MockInner {
    signals: Option<mpsc::UnboundedSender<TransportSignal>>,
    request: Option<ConnectRequest>,
    error_on_connect: Option<TransportError>,
    sent: Vec<Bytes>,
}

/// Scriptable in-memory transport provider.
#[derive(Clone, Default)]
pub struct MockTransportProvider {
    inner: Arc<Mutex<MockInner>>,
}

impl MockTransportProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot failure emitted instead of `Opened` on the next
    /// `connect`.
    pub fn fail_next_connect(&self, error: TransportError) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.error_on_connect = Some(error);
        }
    }

    /// Emits a raw inbound frame as if the transport received it.
    pub fn push_message(&self, payload: Bytes) {
        self.emit(TransportSignal::Message(payload));
    }

    /// Emits a transport failure signal.
    pub fn emit_failure(&self, error: TransportError) {
        self.emit(TransportSignal::Failed(error));
    }

    /// Payloads captured from `send`, in call order.
    pub fn sent(&self) -> Vec<Bytes> {
        self.inner
            .lock()
            .map(|inner| inner.sent.clone())
            .unwrap_or_default()
    }

    /// Most recent request passed to `configure`.
    pub fn last_request(&self) -> Option<ConnectRequest> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.request.clone())
    }

    fn emit(&self, signal: TransportSignal) {
        if let Ok(inner) = self.inner.lock() {
            if let Some(signals) = &inner.signals {
                let _ = signals.send(signal);
            }
        }
    }
}

impl TransportProvider for MockTransportProvider {
    fn bind(&mut self, signals: mpsc::UnboundedSender<TransportSignal>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.signals = Some(signals);
        }
    }

    fn configure(&mut self, request: ConnectRequest) -> Result<(), TransportError> {
        if let Ok(mut inner) = self.inner.lock() {
            inner.request = Some(request);
        }
        Ok(())
    }

    fn connect(&mut self) {
        let armed = self
            .inner
            .lock()
            .ok()
            .and_then(|mut inner| inner.error_on_connect.take());
        match armed {
            Some(error) => self.emit(TransportSignal::Failed(error)),
            None => self.emit(TransportSignal::Opened),
        }
    }

    fn disconnect(&mut self) {
        self.emit(TransportSignal::Closed {
            code: 1000,
            reason: "clean".to_string(),
            was_clean: true,
        });
    }

    fn send(&mut self, payload: Bytes) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.sent.push(payload);
        }
    }
}
