//! Subscriber-facing contract of the stream adapter, driven by the
//! scriptable mock provider.

use std::time::Duration;

use bytes::Bytes;
use secrecy::SecretString;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use voxstream_sdk::stream::adapter::{
    ChannelSubscriber, ConnectionStatus, StreamAdapter,
};
use voxstream_sdk::stream::provider::{ConnectRequest, TransportError, STREAM_ENDPOINT};
use voxstream_sdk::stream::proto::{DecodeError, TranscriptEvent};
use voxstream_sdk::stream::testing::MockTransportProvider;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_TIMEOUT: Duration = Duration::from_millis(50);

fn test_request() -> ConnectRequest {
    ConnectRequest::new(STREAM_ENDPOINT)
        .with_api_key(SecretString::new("test-api-key".to_string()))
}

async fn recv_or_panic<T>(rx: &mut UnboundedReceiver<T>, what: &str) -> T {
    timeout(RECV_TIMEOUT, rx.recv())
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .unwrap_or_else(|| panic!("channel closed waiting for {what}"))
}

async fn assert_quiet<T: std::fmt::Debug>(rx: &mut UnboundedReceiver<T>, what: &str) {
    if let Ok(Some(notice)) = timeout(QUIET_TIMEOUT, rx.recv()).await {
        panic!("expected no further {what}, got {notice:?}");
    }
}

/// Waits until the adapter's pump has recorded `expected`.
async fn wait_for_status(adapter: &StreamAdapter, expected: ConnectionStatus) {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while adapter.status() != expected {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for adapter status {expected:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn healthy_connect_then_disconnect_reports_connected_then_closed_once() {
    let provider = MockTransportProvider::new();
    let mut adapter = StreamAdapter::new(provider.clone());
    let (subscriber, mut status_rx, _event_rx) = ChannelSubscriber::channel();
    adapter.set_subscriber(subscriber);

    adapter.configure(test_request()).expect("configure");
    adapter.connect().expect("connect");
    adapter.disconnect();

    let connected = recv_or_panic(&mut status_rx, "connected status").await;
    assert_eq!(connected.status, ConnectionStatus::Connected);
    assert!(connected.error.is_none());

    let closed = recv_or_panic(&mut status_rx, "closed status").await;
    assert_eq!(closed.status, ConnectionStatus::Closed);
    assert!(closed.error.is_none());

    assert_quiet(&mut status_rx, "status notices").await;
}

#[tokio::test]
async fn failing_open_reports_unknown_with_error_and_never_connected() {
    let provider = MockTransportProvider::new();
    provider.fail_next_connect(TransportError::Injected("socket could not init".to_string()));
    let mut adapter = StreamAdapter::new(provider.clone());
    let (subscriber, mut status_rx, _event_rx) = ChannelSubscriber::channel();
    adapter.set_subscriber(subscriber);

    adapter.configure(test_request()).expect("configure");
    adapter.connect().expect("connect");

    let notice = recv_or_panic(&mut status_rx, "failure status").await;
    assert_eq!(notice.status, ConnectionStatus::Unknown);
    assert!(matches!(notice.error, Some(TransportError::Injected(_))));

    assert_quiet(&mut status_rx, "status notices").await;
    assert_eq!(adapter.status(), ConnectionStatus::Unknown);
}

#[tokio::test]
async fn malformed_frame_yields_single_decode_error_notice() {
    let provider = MockTransportProvider::new();
    let mut adapter = StreamAdapter::new(provider.clone());
    let (subscriber, _status_rx, mut event_rx) = ChannelSubscriber::channel();
    adapter.set_subscriber(subscriber);
    adapter.configure(test_request()).expect("configure");
    adapter.connect().expect("connect");

    provider.push_message(Bytes::from_static(b"not json at all"));

    let notice = recv_or_panic(&mut event_rx, "decode-error notice").await;
    assert!(notice.event.is_none());
    assert!(matches!(notice.decode_error, Some(DecodeError::Json(_))));

    assert_quiet(&mut event_rx, "event notices").await;
}

#[tokio::test]
async fn empty_frame_is_reported_not_dropped() {
    let provider = MockTransportProvider::new();
    let mut adapter = StreamAdapter::new(provider.clone());
    let (subscriber, _status_rx, mut event_rx) = ChannelSubscriber::channel();
    adapter.set_subscriber(subscriber);
    adapter.configure(test_request()).expect("configure");
    adapter.connect().expect("connect");

    provider.push_message(Bytes::new());

    let notice = recv_or_panic(&mut event_rx, "decode-error notice").await;
    assert!(notice.event.is_none());
    assert!(matches!(notice.decode_error, Some(DecodeError::EmptyFrame)));
}

#[tokio::test]
async fn decoded_events_arrive_in_frame_order() {
    let provider = MockTransportProvider::new();
    let mut adapter = StreamAdapter::new(provider.clone());
    let (subscriber, _status_rx, mut event_rx) = ChannelSubscriber::channel();
    adapter.set_subscriber(subscriber);
    adapter.configure(test_request()).expect("configure");
    adapter.connect().expect("connect");

    provider.push_message(Bytes::from_static(
        br#"{"type":"session_started","session_id":"sess-1"}"#,
    ));
    provider.push_message(Bytes::from_static(
        br#"{"type":"transcript","results":[]}"#,
    ));

    let first = recv_or_panic(&mut event_rx, "session_started event").await;
    assert!(matches!(
        first.event,
        Some(TranscriptEvent::SessionStarted { ref session_id, .. }) if session_id == "sess-1"
    ));
    assert!(first.decode_error.is_none());

    let second = recv_or_panic(&mut event_rx, "transcript event").await;
    assert!(matches!(
        second.event,
        Some(TranscriptEvent::Transcript { ref results }) if results.is_empty()
    ));
}

#[tokio::test]
async fn send_forwards_payload_byte_identical_exactly_once() {
    let provider = MockTransportProvider::new();
    let mut adapter = StreamAdapter::new(provider.clone());
    adapter.configure(test_request()).expect("configure");
    adapter.connect().expect("connect");

    let payload = Bytes::from_static(&[0x00, 0x01, 0xfe, 0xff, 0x42]);
    adapter.send(payload.clone());

    assert_eq!(provider.sent(), vec![payload]);
}

#[tokio::test]
async fn empty_payload_is_forwarded_unchanged() {
    let provider = MockTransportProvider::new();
    let mut adapter = StreamAdapter::new(provider.clone());
    adapter.configure(test_request()).expect("configure");
    adapter.connect().expect("connect");

    adapter.send(Bytes::new());

    let sent = provider.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].is_empty());
}

#[tokio::test]
async fn rebind_never_delivers_to_previous_subscriber() {
    let provider = MockTransportProvider::new();
    let mut adapter = StreamAdapter::new(provider.clone());
    let (first, mut first_status_rx, mut first_event_rx) = ChannelSubscriber::channel();
    adapter.set_subscriber(first);
    adapter.configure(test_request()).expect("configure");
    adapter.connect().expect("connect");

    let notice = recv_or_panic(&mut first_status_rx, "connected status").await;
    assert_eq!(notice.status, ConnectionStatus::Connected);

    let (second, mut second_status_rx, mut second_event_rx) = ChannelSubscriber::channel();
    adapter.set_subscriber(second);

    provider.push_message(Bytes::from_static(
        br#"{"type":"session_started","session_id":"sess-2"}"#,
    ));
    adapter.disconnect();

    let event = recv_or_panic(&mut second_event_rx, "event on new subscriber").await;
    assert!(event.event.is_some());
    let closed = recv_or_panic(&mut second_status_rx, "closed on new subscriber").await;
    assert_eq!(closed.status, ConnectionStatus::Closed);

    assert_quiet(&mut first_status_rx, "statuses on old subscriber").await;
    assert_quiet(&mut first_event_rx, "events on old subscriber").await;
}

#[tokio::test]
async fn disconnect_before_connect_makes_instance_terminal() {
    let provider = MockTransportProvider::new();
    let mut adapter = StreamAdapter::new(provider.clone());
    let (subscriber, mut status_rx, _event_rx) = ChannelSubscriber::channel();
    adapter.set_subscriber(subscriber);
    adapter.configure(test_request()).expect("configure");

    adapter.disconnect();
    let closed = recv_or_panic(&mut status_rx, "closed status").await;
    assert_eq!(closed.status, ConnectionStatus::Closed);

    assert!(matches!(
        adapter.connect(),
        Err(TransportError::ReconfigureRequired)
    ));

    adapter.configure(test_request()).expect("reconfigure");
    adapter.connect().expect("connect after reconfigure");
    assert_eq!(
        recv_or_panic(&mut status_rx, "connected status").await.status,
        ConnectionStatus::Connected
    );
}

#[tokio::test]
async fn transport_failure_before_connect_requires_reconfigure() {
    let provider = MockTransportProvider::new();
    let mut adapter = StreamAdapter::new(provider.clone());
    let (subscriber, mut status_rx, _event_rx) = ChannelSubscriber::channel();
    adapter.set_subscriber(subscriber);
    adapter.configure(test_request()).expect("configure");

    provider.emit_failure(TransportError::SendQueueClosed);
    let unknown = recv_or_panic(&mut status_rx, "unknown status").await;
    assert_eq!(unknown.status, ConnectionStatus::Unknown);

    assert!(matches!(
        adapter.connect(),
        Err(TransportError::ReconfigureRequired)
    ));
}

#[tokio::test]
async fn late_subscriber_receives_only_post_bind_notices() {
    let provider = MockTransportProvider::new();
    let mut adapter = StreamAdapter::new(provider.clone());
    adapter.configure(test_request()).expect("configure");

    // Delivered while no subscriber is bound; both must be dropped.
    provider.push_message(Bytes::from_static(
        br#"{"type":"session_started","session_id":"sess-before"}"#,
    ));
    adapter.connect().expect("connect");
    wait_for_status(&adapter, ConnectionStatus::Connected).await;

    let (subscriber, mut status_rx, mut event_rx) = ChannelSubscriber::channel();
    adapter.set_subscriber(subscriber);

    provider.push_message(Bytes::from_static(
        br#"{"type":"session_started","session_id":"sess-after"}"#,
    ));
    adapter.disconnect();

    let event = recv_or_panic(&mut event_rx, "post-bind event").await;
    assert!(matches!(
        event.event,
        Some(TranscriptEvent::SessionStarted { ref session_id, .. })
            if session_id == "sess-after"
    ));
    let status = recv_or_panic(&mut status_rx, "post-bind status").await;
    assert_eq!(status.status, ConnectionStatus::Closed);

    assert_quiet(&mut event_rx, "event notices").await;
    assert_quiet(&mut status_rx, "status notices").await;
}

#[tokio::test]
async fn transport_failure_after_open_transitions_to_unknown() {
    let provider = MockTransportProvider::new();
    let mut adapter = StreamAdapter::new(provider.clone());
    let (subscriber, mut status_rx, _event_rx) = ChannelSubscriber::channel();
    adapter.set_subscriber(subscriber);
    adapter.configure(test_request()).expect("configure");
    adapter.connect().expect("connect");

    let connected = recv_or_panic(&mut status_rx, "connected status").await;
    assert_eq!(connected.status, ConnectionStatus::Connected);

    provider.emit_failure(TransportError::SendQueueClosed);

    let unknown = recv_or_panic(&mut status_rx, "unknown status").await;
    assert_eq!(unknown.status, ConnectionStatus::Unknown);
    assert!(matches!(
        unknown.error,
        Some(TransportError::SendQueueClosed)
    ));
    assert_eq!(adapter.status(), ConnectionStatus::Unknown);
}
