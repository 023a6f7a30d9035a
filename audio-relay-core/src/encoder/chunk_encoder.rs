use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::chunk::EncodedChunk;
use crate::models::config::{EncoderDrive, RelayConfiguration};
use crate::models::error::RelayError;
use crate::processing::pcm;
use crate::processing::sample_ring::SampleRing;
use crate::traits::chunk_codec::ChunkCodec;
use crate::traits::media_source::AudioBufferCallback;

/// Receives every emitted chunk, in emission order.
pub type ChunkSink = Arc<dyn Fn(EncodedChunk) + Send + Sync + 'static>;

/// Invoked once when the encoder stops because of an error.
pub type FailureCallback = Arc<dyn Fn(RelayError) + Send + Sync + 'static>;

/// Counters for debugging an encoder.
#[derive(Debug, Clone, Default)]
pub struct EncoderDiagnostics {
    pub input_callbacks: u64,
    pub input_samples: u64,
    pub ticks: u64,
    pub chunks_emitted: u64,
    pub bytes_emitted: u64,
    pub suppressed_ticks: u64,
    pub dropped_samples: u64,
    pub last_level: f32,
}

struct Emitter {
    sink: ChunkSink,
    on_failure: FailureCallback,
}

/// State shared between the owner, the stream callback and the timer thread.
struct EncoderShared {
    codec: Mutex<Box<dyn ChunkCodec>>,
    ring: Mutex<SampleRing>,
    diagnostics: Mutex<EncoderDiagnostics>,
    emitter: Mutex<Option<Emitter>>,
    running: AtomicBool,
    failed: AtomicBool,
}

impl EncoderShared {
    /// Encode whatever the ring holds and hand it to the sink.
    ///
    /// The codec lock is held through the sink call, so emission is strictly
    /// sequential no matter which thread ticks.
    fn emit_pending(&self) -> Result<Option<EncodedChunk>, RelayError> {
        let mut codec = self.codec.lock();

        let (samples, sample_rate, channels, dropped) = {
            let mut ring = self.ring.lock();
            let (rate, ch) = ring.format();
            (ring.drain(), rate, ch, ring.dropped())
        };

        {
            let mut d = self.diagnostics.lock();
            d.ticks += 1;
            d.dropped_samples = dropped;
        }

        if samples.is_empty() {
            self.diagnostics.lock().suppressed_ticks += 1;
            return Ok(None);
        }

        let level = pcm::rms_level(&samples);
        let bytes = codec
            .encode(&samples, sample_rate, channels)
            .map_err(|e| match e {
                RelayError::EncodingFailed(_) => e,
                other => RelayError::EncodingFailed(other.to_string()),
            })?;

        if bytes.is_empty() {
            self.diagnostics.lock().suppressed_ticks += 1;
            return Ok(None);
        }

        let chunk = EncodedChunk::from(bytes);
        {
            let mut d = self.diagnostics.lock();
            d.chunks_emitted += 1;
            d.bytes_emitted += chunk.len() as u64;
            d.last_level = level;
        }

        let sink = self.emitter.lock().as_ref().map(|e| Arc::clone(&e.sink));
        if let Some(sink) = sink {
            sink(chunk.clone());
        }
        Ok(Some(chunk))
    }

    fn run_tick(&self) -> Result<Option<EncodedChunk>, RelayError> {
        if !self.running.load(Ordering::SeqCst) {
            return Ok(None);
        }
        match self.emit_pending() {
            Ok(chunk) => Ok(chunk),
            Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    fn fail(&self, error: RelayError) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.failed.store(true, Ordering::SeqCst);
        log::error!("Chunk encoder stopped: {}", error);

        let on_failure = self.emitter.lock().as_ref().map(|e| Arc::clone(&e.on_failure));
        if let Some(on_failure) = on_failure {
            on_failure(error);
        }
    }
}

/// Turns a live sample stream into `EncodedChunk`s on a fixed cadence.
///
/// ```text
/// [stream callback] → [SampleRing] → tick every 20ms → [ChunkCodec] → sink
/// ```
///
/// One encoder serves one capture session. It is not restarted after a
/// failure; the lifecycle owner creates a new session instead.
pub struct ChunkEncoder {
    shared: Arc<EncoderShared>,
    interval: Duration,
    drive: EncoderDrive,
    handle: Option<thread::JoinHandle<()>>,
}

impl ChunkEncoder {
    pub fn new(codec: Box<dyn ChunkCodec>, config: &RelayConfiguration) -> Self {
        Self {
            shared: Arc::new(EncoderShared {
                codec: Mutex::new(codec),
                ring: Mutex::new(SampleRing::with_duration(config.sample_buffer_secs)),
                diagnostics: Mutex::new(EncoderDiagnostics::default()),
                emitter: Mutex::new(None),
                running: AtomicBool::new(false),
                failed: AtomicBool::new(false),
            }),
            interval: config.chunk_interval(),
            drive: config.encoder_drive,
            handle: None,
        }
    }

    /// Callback to hand to the audio stream; buffers samples for the next tick.
    pub fn input_callback(&self) -> AudioBufferCallback {
        let shared = Arc::clone(&self.shared);
        Arc::new(move |samples: &[f32], sample_rate: f64, channels: u16| {
            shared.ring.lock().write(samples, sample_rate, channels);
            let mut d = shared.diagnostics.lock();
            d.input_callbacks += 1;
            d.input_samples += samples.len() as u64;
        })
    }

    /// Start emitting chunks to `sink`.
    ///
    /// Rejected while already running, so a second call can never register a
    /// second emitter. Also rejected after a failure.
    pub fn start(&mut self, sink: ChunkSink, on_failure: FailureCallback) -> Result<(), RelayError> {
        if self.shared.running.load(Ordering::SeqCst) {
            return Err(RelayError::InvalidState("encoder already running".into()));
        }
        if self.shared.failed.load(Ordering::SeqCst) {
            return Err(RelayError::InvalidState("encoder has failed".into()));
        }
        self.join_timer();

        // Drop audio captured before recording started
        self.shared.ring.lock().reset();
        self.shared.codec.lock().reset();
        *self.shared.emitter.lock() = Some(Emitter { sink, on_failure });
        self.shared.running.store(true, Ordering::SeqCst);

        if self.drive == EncoderDrive::Thread {
            if let Err(e) = self.start_timer() {
                self.shared.running.store(false, Ordering::SeqCst);
                *self.shared.emitter.lock() = None;
                return Err(e);
            }
        }

        log::debug!(
            "Chunk encoder started ({}, every {}ms, {:?} drive)",
            self.mime_type(),
            self.interval.as_millis(),
            self.drive
        );
        Ok(())
    }

    /// Run one encode step. Used by hosts with `EncoderDrive::External`.
    ///
    /// Returns the emitted chunk, `None` if nothing was emitted (not running
    /// or zero-size), or the error that stopped the encoder.
    pub fn tick(&self) -> Result<Option<EncodedChunk>, RelayError> {
        self.shared.run_tick()
    }

    /// Stop emitting and flush buffered audio as a final chunk. Idempotent.
    pub fn stop(&mut self) {
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);
        self.join_timer();

        if was_running {
            if let Err(e) = self.shared.emit_pending() {
                log::warn!("Failed to flush encoder on stop: {}", e);
            }
            log::debug!("Chunk encoder stopped");
        }
        *self.shared.emitter.lock() = None;
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn has_failed(&self) -> bool {
        self.shared.failed.load(Ordering::SeqCst)
    }

    pub fn mime_type(&self) -> String {
        self.shared.codec.lock().mime_type().to_string()
    }

    /// Run `f` with the codec's current stream header while no chunk can be
    /// emitted, so whatever `f` sends lands between two chunks.
    pub fn with_stream_header<R>(&self, f: impl FnOnce(Option<EncodedChunk>) -> R) -> R {
        let codec = self.shared.codec.lock();
        f(codec.stream_header().map(EncodedChunk::from))
    }

    pub fn diagnostics(&self) -> EncoderDiagnostics {
        self.shared.diagnostics.lock().clone()
    }

    /// Spawn the timer thread ticking at a fixed cadence.
    fn start_timer(&mut self) -> Result<(), RelayError> {
        let shared = Arc::clone(&self.shared);
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("chunk-encoder".into())
            .spawn(move || {
                let mut deadline = Instant::now() + interval;
                loop {
                    // Park until the deadline; stop() unparks for a prompt exit.
                    loop {
                        if !shared.running.load(Ordering::SeqCst) {
                            return;
                        }
                        let now = Instant::now();
                        if now >= deadline {
                            break;
                        }
                        thread::park_timeout(deadline - now);
                    }

                    if shared.run_tick().is_err() {
                        return;
                    }

                    deadline += interval;
                    let now = Instant::now();
                    if deadline < now {
                        // Fell behind; skip missed ticks rather than bursting
                        deadline = now + interval;
                    }
                }
            })
            .map_err(|e| RelayError::EncodingFailed(format!("failed to spawn encoder thread: {}", e)))?;

        self.handle = Some(handle);
        Ok(())
    }

    fn join_timer(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for ChunkEncoder {
    fn drop(&mut self) {
        self.stop();
    }
}
