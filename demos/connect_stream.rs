use std::error::Error;
use std::time::Duration;

use bytes::Bytes;
use secrecy::SecretString;
use voxstream_sdk::retry::with_timeout;
use voxstream_sdk::stream::adapter::{ChannelSubscriber, ConnectionStatus, StreamAdapter};
use voxstream_sdk::stream::provider::{ConnectRequest, WebSocketProvider, STREAM_ENDPOINT};
use voxstream_sdk::stream::proto::TranscriptEvent;

fn main() -> Result<(), Box<dyn Error>> {
    let api_key = "REPLACE_WITH_API_KEY".to_string();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let mut adapter = StreamAdapter::new(WebSocketProvider::new());
        let (subscriber, mut status_rx, mut event_rx) = ChannelSubscriber::channel();
        adapter.set_subscriber(subscriber);

        adapter.configure(
            ConnectRequest::new(STREAM_ENDPOINT).with_api_key(SecretString::new(api_key)),
        )?;
        adapter.connect()?;

        let connected = with_timeout(Duration::from_secs(10), status_rx.recv())
            .await
            .map_err(|_| "timed out waiting for connection status")?
            .ok_or("status channel closed")?;
        if connected.status != ConnectionStatus::Connected {
            return Err(format!("connect failed: {:?}", connected.error).into());
        }
        println!("connected");

        // Replace with real audio capture; an empty chunk keeps the demo inert.
        adapter.send(Bytes::new());

        while let Some(notice) = event_rx.recv().await {
            match notice.event {
                Some(TranscriptEvent::SessionStarted { session_id, .. }) => {
                    println!("session started session_id={session_id}");
                }
                Some(TranscriptEvent::Transcript { results }) => {
                    for result in results {
                        if let Some(alternative) = result.alternatives.first() {
                            let marker = if result.is_partial { "partial" } else { "final" };
                            println!("{marker}: {}", alternative.transcript);
                        }
                    }
                }
                Some(TranscriptEvent::ServiceError { code, message }) => {
                    eprintln!("service error code={code} message={message}");
                    break;
                }
                None => {
                    if let Some(err) = notice.decode_error {
                        eprintln!("dropped undecodable frame: {err}");
                    }
                }
            }
        }

        adapter.disconnect();
        Ok::<(), Box<dyn Error>>(())
    })
}
