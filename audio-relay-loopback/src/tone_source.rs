//! Synthetic capture streams for `SourceDirectory` sources.
//!
//! Each stream runs a generator thread that delivers interleaved f32 sine
//! packets every 10ms, the same shape a platform capture callback delivers.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use audio_relay_core::models::error::RelayError;
use audio_relay_core::models::source::SourceHandle;
use audio_relay_core::traits::media_source::{AudioBufferCallback, AudioStream, MediaSourceAcquirer};

use crate::source_directory::SourceDirectory;

const PACKET_INTERVAL: Duration = Duration::from_millis(10);
const AMPLITUDE: f32 = 0.25;

/// Acquires tone streams for sources in a `SourceDirectory`.
pub struct ToneSourceAcquirer {
    directory: SourceDirectory,
    sample_rate: f64,
    channels: u16,
}

impl ToneSourceAcquirer {
    pub fn new(directory: SourceDirectory) -> Self {
        Self {
            directory,
            sample_rate: 48000.0,
            channels: 2,
        }
    }

    /// Deliver audio in a format other than the relay's output format.
    pub fn with_format(mut self, sample_rate: f64, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }
}

impl MediaSourceAcquirer for ToneSourceAcquirer {
    fn acquire(&mut self, source: &SourceHandle) -> Result<Box<dyn AudioStream>, RelayError> {
        let tone = self.directory.tone(&source.id).ok_or(RelayError::SourceGone)?;
        if self.directory.is_blocked(&source.id) {
            return Err(RelayError::PermissionDenied);
        }
        if self.sample_rate <= 0.0 || self.channels == 0 {
            return Err(RelayError::AcquisitionFailed(format!(
                "unsupported tone format: {}Hz x{}",
                self.sample_rate, self.channels
            )));
        }

        log::debug!("Acquired tone stream for source {} ({}Hz)", source.id, tone.frequency);
        Ok(Box::new(ToneStream {
            directory: self.directory.clone(),
            source_id: source.id.clone(),
            generation: tone.generation,
            frequency: tone.frequency,
            tracks: if tone.muted { 0 } else { 1 },
            sample_rate: self.sample_rate,
            channels: self.channels,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }))
    }
}

/// One live tone stream with a single audio track.
pub struct ToneStream {
    directory: SourceDirectory,
    source_id: String,
    generation: u64,
    frequency: f32,
    tracks: usize,
    sample_rate: f64,
    channels: u16,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl AudioStream for ToneStream {
    fn audio_track_count(&self) -> usize {
        self.tracks
    }

    fn start_track(&mut self, index: usize, callback: AudioBufferCallback) -> Result<(), RelayError> {
        if index >= self.tracks {
            return Err(RelayError::NoAudioTrack);
        }
        if self.running.load(Ordering::SeqCst) {
            return Err(RelayError::InvalidState("tone track already started".into()));
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let directory = self.directory.clone();
        let source_id = self.source_id.clone();
        let generation = self.generation;
        let mut generator = ToneGenerator::new(self.frequency, self.sample_rate, self.channels);

        let handle = thread::Builder::new()
            .name(format!("tone-capture-{}", self.source_id))
            .spawn(move || {
                let mut deadline = Instant::now();
                while running.load(Ordering::SeqCst) {
                    if !directory.is_current(&source_id, generation) {
                        log::debug!("Tone stream for source {} went stale", source_id);
                        break;
                    }
                    let packet = generator.next_packet(PACKET_INTERVAL);
                    callback(&packet, generator.sample_rate, generator.channels);

                    deadline += PACKET_INTERVAL;
                    if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                        thread::park_timeout(wait);
                    } else {
                        deadline = Instant::now();
                    }
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| RelayError::AcquisitionFailed(format!("failed to spawn tone thread: {}", e)))?;

        self.handle = Some(handle);
        Ok(())
    }

    fn stop_all_tracks(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
            log::debug!("Tone stream for source {} stopped", self.source_id);
        }
    }

    fn is_live(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.directory.is_current(&self.source_id, self.generation)
    }
}

impl Drop for ToneStream {
    fn drop(&mut self) {
        self.stop_all_tracks();
    }
}

/// Phase-continuous sine generator producing interleaved packets.
pub(crate) struct ToneGenerator {
    frequency: f32,
    sample_rate: f64,
    channels: u16,
    phase: f32,
}

impl ToneGenerator {
    pub(crate) fn new(frequency: f32, sample_rate: f64, channels: u16) -> Self {
        Self {
            frequency,
            sample_rate,
            channels,
            phase: 0.0,
        }
    }

    pub(crate) fn next_packet(&mut self, duration: Duration) -> Vec<f32> {
        let frames = (self.sample_rate * duration.as_secs_f64()).round() as usize;
        let step = TAU * self.frequency / self.sample_rate as f32;
        let mut packet = Vec::with_capacity(frames * self.channels as usize);
        for _ in 0..frames {
            let value = AMPLITUDE * self.phase.sin();
            packet.extend(std::iter::repeat_n(value, self.channels as usize));
            self.phase = (self.phase + step) % TAU;
        }
        packet
    }
}
