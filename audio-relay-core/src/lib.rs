//! # audio-relay-core
//!
//! Platform-agnostic live audio relay.
//!
//! Captures one source, encodes it into small chunks on a fixed cadence,
//! fans every chunk out to 0..N consumers, and rebuilds a gapless playback
//! buffer on each consumer. Platform backends implement the traits in
//! `traits/` and plug into the generic `AudioRelay`.
//!
//! ## Architecture
//!
//! ```text
//! audio-relay-core (this crate)
//! ├── traits/       ← MediaSourceAcquirer, AudioStream, ChunkCodec, ConsumerPort, MediaBuffer, RelayDelegate
//! ├── models/       ← RelayError, CaptureStatus, RelayConfiguration, EncodedChunk, ControlMessage, etc.
//! ├── processing/   ← SampleRing, PCM conversion, WAV streaming header
//! ├── encoder/      ← ChunkEncoder (20ms cadence), PcmChunkCodec
//! ├── fanout/       ← TransportFanout (consumer registry, broadcast)
//! ├── playback/     ← PlaybackReassembler, ConsumerEndpoint
//! ├── session/      ← AudioRelay (lifecycle state machine), CaptureSession, TitleWatcher
//! └── storage/      ← SelectionStore
//! ```

pub mod encoder;
pub mod fanout;
pub mod models;
pub mod playback;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export key types at crate root for convenience.
pub use encoder::chunk_encoder::{ChunkEncoder, ChunkSink, EncoderDiagnostics, FailureCallback};
pub use encoder::pcm_codec::PcmChunkCodec;
pub use fanout::registry::{BroadcastReport, TransportFanout};
pub use models::chunk::EncodedChunk;
pub use models::config::{EncoderDrive, RelayConfiguration};
pub use models::consumer::{ConnectionState, ConsumerId};
pub use models::error::RelayError;
pub use models::message::{ControlMessage, ControlSelection, RelayMessage};
pub use models::source::SourceHandle;
pub use models::state::{CaptureStatus, ReassemblerState, StatusIndicator};
pub use playback::consumer_endpoint::ConsumerEndpoint;
pub use playback::reassembler::PlaybackReassembler;
pub use processing::pcm::StreamResampler;
pub use processing::sample_ring::SampleRing;
pub use session::capture_session::CaptureSession;
pub use session::relay::{AudioRelay, RelayEvent, RelayHandle};
pub use storage::selection::{PersistedSelection, SelectionStore};
pub use traits::chunk_codec::{ChunkCodec, CodecFactory};
pub use traits::consumer_port::ConsumerPort;
pub use traits::media_buffer::{BufferReadyState, MediaBuffer, PlaybackOutput};
pub use traits::media_source::{AudioBufferCallback, AudioStream, MediaSourceAcquirer};
pub use traits::relay_delegate::RelayDelegate;
pub use traits::source_inspector::SourceInspector;
