use thiserror::Error;

/// Errors that can occur while relaying captured audio.
///
/// Acquisition and encoding errors end the current capture session.
/// `BufferContention` is a scheduling condition on the consumer side and
/// `ChannelGone` only removes the affected consumer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("capture source is gone")]
    SourceGone,

    #[error("capture stream has no audio track")]
    NoAudioTrack,

    #[error("acquisition failed: {0}")]
    AcquisitionFailed(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("playback buffer is busy")]
    BufferContention,

    #[error("consumer channel gone: {0}")]
    ChannelGone(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),
}

impl RelayError {
    /// Whether this error ends the capture session it occurred in.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied
                | Self::SourceGone
                | Self::NoAudioTrack
                | Self::AcquisitionFailed(_)
                | Self::EncodingFailed(_)
        )
    }

    pub fn is_acquisition_error(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied | Self::SourceGone | Self::NoAudioTrack | Self::AcquisitionFailed(_)
        )
    }
}
