//! Transcript wire events and event decoding.
//!
//! The stream service delivers JSON text frames. Each frame decodes into a
//! [`TranscriptEvent`]; the decoder seam is pluggable so integrations with a
//! different wire format can substitute their own [`EventDecoder`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of a recognized transcript item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Pronunciation,
    Punctuation,
}

/// Single recognized token within an alternative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptItem {
    /// Offset of the item start from stream begin, in milliseconds.
    pub start_ms: u64,
    /// Offset of the item end from stream begin, in milliseconds.
    pub end_ms: u64,
    pub kind: ItemKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Speaker label when diarization is enabled for the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// One hypothesis for a result segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptAlternative {
    pub transcript: String,
    pub items: Vec<TranscriptItem>,
}

/// Result segment covering a span of audio.
///
/// Partial results carry the same `result_id` as the final result that
/// eventually replaces them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptResult {
    pub result_id: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub is_partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    pub alternatives: Vec<TranscriptAlternative>,
}

/// Decoded event delivered to stream subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEvent {
    SessionStarted {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        language_code: Option<String>,
    },
    Transcript {
        results: Vec<TranscriptResult>,
    },
    /// Service-level error reported in-band on the stream.
    ServiceError {
        code: String,
        message: String,
    },
}

impl TranscriptEvent {
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Errors produced while decoding an inbound frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Frame payload is not valid UTF-8.
    #[error("frame is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Frame payload is not a valid event document.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame carried no payload at all.
    #[error("empty frame")]
    EmptyFrame,
}

/// Pluggable decoder applied to every raw inbound frame.
///
/// Implementations must not assume the input is well formed; decode failures
/// are reported to the subscriber, never dropped or panicked on.
pub trait EventDecoder: Send + Sync + 'static {
    fn decode(&self, raw: &[u8]) -> Result<TranscriptEvent, DecodeError>;
}

/// Default decoder for the JSON text protocol.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonEventDecoder;

impl EventDecoder for JsonEventDecoder {
    fn decode(&self, raw: &[u8]) -> Result<TranscriptEvent, DecodeError> {
        if raw.is_empty() {
            return Err(DecodeError::EmptyFrame);
        }
        let text = std::str::from_utf8(raw)?;
        Ok(TranscriptEvent::from_text(text)?)
    }
}
