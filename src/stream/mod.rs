//! Realtime stream modules.
//!
//! - `adapter`: bridges raw transport signals to subscriber notifications.
//! - `provider`: transport provider contract and the default websocket
//!   provider.
//! - `proto`: transcript wire events and the pluggable event decoder.
//! - `testing`: scriptable in-memory provider for consumer tests.

/// Streaming transport adapter and subscriber contract.
pub mod adapter;
/// Transcript wire events and event decoding.
pub mod proto;
/// Transport provider contract and websocket implementation.
pub mod provider;
/// Test-support transport provider.
pub mod testing;
