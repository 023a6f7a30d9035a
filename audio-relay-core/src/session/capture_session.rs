use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::encoder::chunk_encoder::{ChunkEncoder, ChunkSink, EncoderDiagnostics, FailureCallback};
use crate::models::chunk::EncodedChunk;
use crate::models::config::RelayConfiguration;
use crate::models::error::RelayError;
use crate::models::source::SourceHandle;
use crate::session::title_watcher::TitleWatcher;
use crate::traits::chunk_codec::ChunkCodec;
use crate::traits::media_source::{AudioStream, MediaSourceAcquirer};

/// One acquired stream of one source, with its encoder and title watcher.
///
/// ```text
/// [AudioStream track 0] → [ChunkEncoder] → sink (fanout)
///                  [TitleWatcher] → relay events
/// ```
///
/// A session is never reused: after `teardown` the relay drops it and a
/// new acquisition creates a new session.
pub struct CaptureSession {
    id: Uuid,
    source: SourceHandle,
    stream: Option<Box<dyn AudioStream>>,
    encoder: ChunkEncoder,
    watcher: Option<TitleWatcher>,
    started_at: DateTime<Utc>,
    torn_down: bool,
}

impl CaptureSession {
    /// Acquire a live stream for `source` and route its first audio track
    /// into a fresh encoder. The encoder stays idle until `start_recording`.
    pub fn acquire(
        acquirer: &mut dyn MediaSourceAcquirer,
        source: SourceHandle,
        codec: Box<dyn ChunkCodec>,
        config: &RelayConfiguration,
    ) -> Result<Self, RelayError> {
        if !source.live {
            return Err(RelayError::SourceGone);
        }

        let encoder = ChunkEncoder::new(codec, config);
        let mut stream = acquirer.acquire(&source)?;

        let tracks = stream.audio_track_count();
        if tracks == 0 {
            stream.stop_all_tracks();
            return Err(RelayError::NoAudioTrack);
        }
        if tracks > 1 {
            log::debug!("Source {} has {} audio tracks, using the first", source.id, tracks);
        }
        if let Err(e) = stream.start_track(0, encoder.input_callback()) {
            stream.stop_all_tracks();
            return Err(e);
        }

        let id = Uuid::new_v4();
        log::info!("Capture session {} acquired source {} ({:?})", id, source.id, source.title);

        Ok(Self {
            id,
            source,
            stream: Some(stream),
            encoder,
            watcher: None,
            started_at: Utc::now(),
            torn_down: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> &SourceHandle {
        &self.source
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.source.title = title.into();
    }

    /// The source was closed or navigated; its handle must not be reused.
    pub fn invalidate_source(&mut self) {
        self.source.invalidate();
    }

    pub fn attach_watcher(&mut self, watcher: TitleWatcher) {
        if let Some(mut previous) = self.watcher.replace(watcher) {
            previous.stop();
        }
    }

    /// Start the encoder. Only one emitter per session can ever exist.
    pub fn start_recording(&mut self, sink: ChunkSink, on_failure: FailureCallback) -> Result<(), RelayError> {
        if self.torn_down {
            return Err(RelayError::InvalidState("capture session already torn down".into()));
        }
        self.encoder.start(sink, on_failure)?;
        log::info!("Capture session {} recording ({})", self.id, self.encoder.mime_type());
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.encoder.is_running()
    }

    pub fn is_live(&self) -> bool {
        !self.torn_down && self.stream.as_ref().is_some_and(|s| s.is_live())
    }

    /// One encode step for externally driven encoders.
    pub fn tick(&self) -> Result<Option<EncodedChunk>, RelayError> {
        self.encoder.tick()
    }

    /// See `ChunkEncoder::with_stream_header`.
    pub fn with_stream_header<R>(&self, f: impl FnOnce(Option<EncodedChunk>) -> R) -> R {
        self.encoder.with_stream_header(f)
    }

    pub fn mime_type(&self) -> String {
        self.encoder.mime_type()
    }

    pub fn encoder_diagnostics(&self) -> EncoderDiagnostics {
        self.encoder.diagnostics()
    }

    /// Flush and stop the encoder, release the platform stream, stop the
    /// title watcher. Safe to call more than once.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        self.encoder.stop();
        if let Some(mut stream) = self.stream.take() {
            stream.stop_all_tracks();
        }

        let d = self.encoder.diagnostics();
        log::info!(
            "Capture session {} torn down after {}s ({} chunks, {} bytes)",
            self.id,
            (Utc::now() - self.started_at).num_seconds(),
            d.chunks_emitted,
            d.bytes_emitted
        );
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
