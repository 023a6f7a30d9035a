use crate::models::error::RelayError;

/// Lifecycle of a consumer's media buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferReadyState {
    Closed,
    Open,
    Ended,
}

/// Consumer-side contiguous media buffer fed with encoded chunks.
///
/// Appends are processed asynchronously: after `append` the buffer reports
/// `is_updating()` until the platform signals the update finished.
pub trait MediaBuffer {
    fn ready_state(&self) -> BufferReadyState;

    fn is_updating(&self) -> bool;

    /// Append one chunk. Fails with `BufferContention` while updating.
    fn append(&mut self, data: &[u8]) -> Result<(), RelayError>;

    /// Signal end of stream. Only valid when open and not updating.
    fn end_of_stream(&mut self) -> Result<(), RelayError>;

    /// Abort any update, drop all buffered media and reopen empty, ready for
    /// a stream that starts with its own header.
    fn reset(&mut self) -> Result<(), RelayError>;
}

/// The consumer's output element and audio graph.
pub trait PlaybackOutput {
    /// Create the output element and bind it to the media buffer. Called
    /// again after `close` when playback restarts on a new stream.
    fn attach(&mut self) -> Result<(), RelayError>;

    /// Whether the output context is suspended (e.g. after an underrun).
    fn is_suspended(&self) -> bool;

    fn resume(&mut self) -> Result<(), RelayError>;

    /// Stop any in-progress local recording of the output.
    fn stop_recording(&mut self) -> Result<(), RelayError>;

    /// Disconnect the audio graph.
    fn disconnect(&mut self) -> Result<(), RelayError>;

    /// Close the output context.
    fn close(&mut self) -> Result<(), RelayError>;
}
