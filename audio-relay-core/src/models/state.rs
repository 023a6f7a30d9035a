use serde::Serialize;

/// Producer-side capture status.
///
/// ```text
/// idle → capturing → recording
///   ↑        │           │
///   └────────┴───────────┘  (teardown)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    /// No live stream.
    #[default]
    Idle,
    /// A live stream is held, the encoder is not emitting.
    Capturing,
    /// The encoder is emitting chunks.
    Recording,
}

impl CaptureStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// A live stream exists (capturing or recording).
    pub fn has_stream(&self) -> bool {
        !self.is_idle()
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }
}

/// Tri-state status surface shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusIndicator {
    #[default]
    Idle,
    Capturing,
    Error,
}

impl StatusIndicator {
    /// CSS color the indicator is rendered with.
    pub fn color(&self) -> &'static str {
        match self {
            Self::Idle => "transparent",
            Self::Capturing => "blue",
            Self::Error => "red",
        }
    }

    pub fn for_status(status: CaptureStatus) -> Self {
        match status {
            CaptureStatus::Idle => Self::Idle,
            CaptureStatus::Capturing | CaptureStatus::Recording => Self::Capturing,
        }
    }
}

/// Consumer-side playback reassembler state machine.
///
/// ```text
/// uninitialized → open → appending ↔ waiting
///                   │         │          │
///                   └──── ended / closed ┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReassemblerState {
    #[default]
    Uninitialized,
    /// Output attached, nothing in flight.
    Open,
    /// An append is being processed by the buffer.
    Appending,
    /// Chunks are queued behind a busy buffer.
    Waiting,
    Ended,
    Closed,
}

impl ReassemblerState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Ended | Self::Closed)
    }
}
