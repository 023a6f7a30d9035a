use std::sync::Arc;

use crate::models::error::RelayError;
use crate::models::source::SourceHandle;

/// Callback invoked when captured audio is available.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples.
/// - `sample_rate`: The actual sample rate of the delivered audio.
/// - `channels`: Number of interleaved channels.
pub type AudioBufferCallback = Arc<dyn Fn(&[f32], f64, u16) + Send + Sync + 'static>;

/// A live platform audio stream obtained from a capture source.
pub trait AudioStream: Send {
    /// Number of audio tracks the platform delivered.
    fn audio_track_count(&self) -> usize;

    /// Start delivering one track's audio through `callback`.
    ///
    /// The callback may fire on a platform thread; keep work minimal.
    fn start_track(&mut self, index: usize, callback: AudioBufferCallback) -> Result<(), RelayError>;

    /// Stop every track, releasing the platform capture lock. Idempotent.
    fn stop_all_tracks(&mut self);

    /// Whether the stream is still delivering audio.
    fn is_live(&self) -> bool;
}

/// Obtains live audio streams for capture sources.
///
/// Implemented by platform backends (the loopback tone source, browser tab
/// capture). Failures map to `PermissionDenied`, `SourceGone`, or
/// `AcquisitionFailed`.
pub trait MediaSourceAcquirer: Send {
    fn acquire(&mut self, source: &SourceHandle) -> Result<Box<dyn AudioStream>, RelayError>;
}
