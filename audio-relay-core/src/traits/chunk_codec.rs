use crate::models::error::RelayError;

/// Encodes raw interleaved samples into transport-ready bytes.
///
/// A codec instance belongs to one capture session; the first chunk it
/// produces may carry an initialization header.
pub trait ChunkCodec: Send {
    /// Media type consumers need to open their playback buffer.
    fn mime_type(&self) -> &str;

    /// Encode one slice. Returning an empty vector means "nothing to emit".
    fn encode(&mut self, samples: &[f32], sample_rate: f64, channels: u16) -> Result<Vec<u8>, RelayError>;

    /// Initialization bytes a consumer joining mid-stream needs before its
    /// first chunk, or `None` if chunks are self-contained or the stream has
    /// not started yet.
    fn stream_header(&self) -> Option<Vec<u8>> {
        None
    }

    /// Forget per-stream state so the next chunk starts a new stream.
    fn reset(&mut self);
}

/// Builds a fresh codec for every capture session.
pub type CodecFactory = Box<dyn Fn() -> Result<Box<dyn ChunkCodec>, RelayError> + Send>;
