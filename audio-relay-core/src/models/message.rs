use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chunk::EncodedChunk;
use super::error::RelayError;

/// Control messages exchanged between relay and consumers.
///
/// Wire form is an object tagged by `type`: `{"type":"requestAudio"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    /// Consumer → relay: send me the current stream.
    RequestAudio,
    /// Relay → consumer: no encoder is active.
    AudioNotReady,
    /// Relay → consumer: the stream ended and the next chunk opens a new one.
    /// Playback must be rebuilt before appending it.
    StreamReset,
}

impl ControlMessage {
    pub fn to_json(&self) -> String {
        // Unit variants of an internally tagged enum always serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> Result<Self, RelayError> {
        serde_json::from_str(json)
            .map_err(|e| RelayError::InvalidState(format!("unrecognized control message: {}", e)))
    }
}

/// Everything the relay sends down a consumer channel.
///
/// One message carries exactly one chunk; consumers assume no other framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    Chunk(EncodedChunk),
    Control(ControlMessage),
}

impl RelayMessage {
    pub fn not_ready() -> Self {
        Self::Control(ControlMessage::AudioNotReady)
    }

    pub fn stream_reset() -> Self {
        Self::Control(ControlMessage::StreamReset)
    }

    pub fn as_chunk(&self) -> Option<&EncodedChunk> {
        match self {
            Self::Chunk(chunk) => Some(chunk),
            Self::Control(_) => None,
        }
    }
}

/// Operator control input. Any field change is a full reconfiguration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlSelection {
    pub source_id: String,
    pub selected_renderer: String,
    pub request_timestamp: DateTime<Utc>,
}

impl ControlSelection {
    pub fn new(source_id: impl Into<String>, selected_renderer: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            selected_renderer: selected_renderer.into(),
            request_timestamp: Utc::now(),
        }
    }
}
