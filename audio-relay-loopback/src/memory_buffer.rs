//! In-memory playback buffer and output for loopback consumers.

use bytes::{Bytes, BytesMut};

use audio_relay_core::models::error::RelayError;
use audio_relay_core::processing::pcm;
use audio_relay_core::traits::media_buffer::{BufferReadyState, MediaBuffer, PlaybackOutput};

/// Contiguous media buffer. An append stays "in flight" (updating) until
/// `finish_update` commits it, mirroring a platform buffer's async append.
pub struct MemoryMediaBuffer {
    data: BytesMut,
    in_flight: Option<Bytes>,
    ready: BufferReadyState,
    appends: u64,
}

impl MemoryMediaBuffer {
    pub fn new() -> Self {
        Self {
            data: BytesMut::new(),
            in_flight: None,
            ready: BufferReadyState::Open,
            appends: 0,
        }
    }

    /// Commit the in-flight append. Returns whether one was pending.
    pub fn finish_update(&mut self) -> bool {
        match self.in_flight.take() {
            Some(chunk) => {
                self.data.extend_from_slice(&chunk);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn appends(&self) -> u64 {
        self.appends
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Decode buffered 16-bit PCM after the streaming WAV header.
    pub fn decoded_samples(&self) -> Vec<f32> {
        if self.data.len() <= pcm::WAV_HEADER_SIZE || &self.data[0..4] != b"RIFF" {
            return Vec::new();
        }
        pcm::i16_le_to_f32(&self.data[pcm::WAV_HEADER_SIZE..])
    }
}

impl Default for MemoryMediaBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaBuffer for MemoryMediaBuffer {
    fn ready_state(&self) -> BufferReadyState {
        self.ready
    }

    fn is_updating(&self) -> bool {
        self.in_flight.is_some()
    }

    fn append(&mut self, data: &[u8]) -> Result<(), RelayError> {
        if self.in_flight.is_some() {
            return Err(RelayError::BufferContention);
        }
        if self.ready != BufferReadyState::Open {
            return Err(RelayError::InvalidState("media buffer is not open".into()));
        }
        self.in_flight = Some(Bytes::copy_from_slice(data));
        self.appends += 1;
        Ok(())
    }

    fn end_of_stream(&mut self) -> Result<(), RelayError> {
        if self.in_flight.is_some() {
            return Err(RelayError::BufferContention);
        }
        if self.ready != BufferReadyState::Open {
            return Err(RelayError::InvalidState("media buffer is not open".into()));
        }
        self.ready = BufferReadyState::Ended;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), RelayError> {
        if self.in_flight.take().is_some() {
            log::debug!("Aborting in-flight append on reset");
        }
        self.data.clear();
        self.ready = BufferReadyState::Open;
        Ok(())
    }
}

/// Output element and audio graph of a loopback consumer.
#[derive(Debug, Default)]
pub struct MemoryOutput {
    attached: bool,
    suspended: bool,
    recording: bool,
    connected: bool,
    closed: bool,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an underrun that suspends the output context.
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Start a local recording of the output.
    pub fn start_recording(&mut self) {
        self.recording = true;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl PlaybackOutput for MemoryOutput {
    fn attach(&mut self) -> Result<(), RelayError> {
        if self.closed {
            log::debug!("Reopening closed output context");
            self.closed = false;
            self.suspended = false;
        }
        self.attached = true;
        self.connected = true;
        Ok(())
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) -> Result<(), RelayError> {
        if self.closed {
            return Err(RelayError::InvalidState("output context closed".into()));
        }
        self.suspended = false;
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), RelayError> {
        self.recording = false;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), RelayError> {
        if !self.connected {
            return Err(RelayError::InvalidState("audio graph not connected".into()));
        }
        self.connected = false;
        Ok(())
    }

    fn close(&mut self) -> Result<(), RelayError> {
        if self.closed {
            return Err(RelayError::InvalidState("output context already closed".into()));
        }
        self.closed = true;
        Ok(())
    }
}
