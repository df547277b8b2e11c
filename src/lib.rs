//! User-facing Rust SDK for the VoxStream realtime transcription stream.
//!
//! The crate is organized by transport surface:
//! - `stream`: transport adapter, pluggable websocket provider, and wire
//!   events for the realtime transcript feed.
//! - `retry`: retry and timeout utilities layered by callers around connect.

/// Retry and timeout helpers used around stream connects.
pub mod retry;
/// Transport adapter, provider contract, protocol events, and test support.
pub mod stream;
