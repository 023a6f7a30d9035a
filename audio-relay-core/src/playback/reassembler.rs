use crate::models::chunk::EncodedChunk;
use crate::models::error::RelayError;
use crate::models::state::ReassemblerState;
use crate::playback::pending_queue::PendingQueue;
use crate::traits::media_buffer::{BufferReadyState, MediaBuffer, PlaybackOutput};

/// Counters for debugging one consumer's playback.
#[derive(Debug, Clone, Default)]
pub struct ReassemblerDiagnostics {
    pub chunks_received: u64,
    pub chunks_appended: u64,
    pub bytes_appended: u64,
    pub contention_retries: u64,
    pub output_resumes: u64,
    pub discarded_after_end: u64,
    pub restarts: u64,
}

/// Rebuilds a gapless playback buffer from incoming chunks.
///
/// A chunk is appended only while the buffer is open and not updating.
/// Anything that arrives while it is busy waits in a FIFO and goes in, in
/// order, on the next `on_buffer_ready`. Nothing is dropped before the
/// stream ends.
pub struct PlaybackReassembler<B: MediaBuffer, O: PlaybackOutput> {
    buffer: B,
    output: O,
    state: ReassemblerState,
    pending: PendingQueue,
    end_requested: bool,
    diagnostics: ReassemblerDiagnostics,
}

impl<B: MediaBuffer, O: PlaybackOutput> PlaybackReassembler<B, O> {
    pub fn new(buffer: B, output: O, backlog_warn_chunks: usize) -> Self {
        Self {
            buffer,
            output,
            state: ReassemblerState::Uninitialized,
            pending: PendingQueue::new(backlog_warn_chunks),
            end_requested: false,
            diagnostics: ReassemblerDiagnostics::default(),
        }
    }

    /// Attach the output to the buffer. Must happen before the first append;
    /// `on_chunk` calls it implicitly.
    pub fn setup(&mut self) -> Result<(), RelayError> {
        match self.state {
            ReassemblerState::Uninitialized => {
                self.output.attach()?;
                self.state = ReassemblerState::Open;
                log::debug!("Playback output attached");
                Ok(())
            }
            ReassemblerState::Ended | ReassemblerState::Closed => Err(RelayError::InvalidState(
                "playback already finished".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Accept one chunk from the relay.
    pub fn on_chunk(&mut self, chunk: EncodedChunk) -> Result<(), RelayError> {
        self.diagnostics.chunks_received += 1;

        if self.state.is_finished() {
            self.diagnostics.discarded_after_end += 1;
            log::debug!("Discarding {}-byte chunk after playback ended", chunk.len());
            return Ok(());
        }
        if self.state == ReassemblerState::Uninitialized {
            self.setup()?;
        }
        if chunk.is_empty() {
            return Ok(());
        }

        self.pending.push_back(chunk);
        self.pump()
    }

    /// The buffer finished an update (or just opened); append what is queued.
    pub fn on_buffer_ready(&mut self) -> Result<(), RelayError> {
        if self.state.is_finished() || self.state == ReassemblerState::Uninitialized {
            return Ok(());
        }
        self.pump()
    }

    /// End the buffer stream once every queued chunk has been appended.
    pub fn end_stream(&mut self) -> Result<(), RelayError> {
        if self.state.is_finished() {
            return Ok(());
        }
        if self.state == ReassemblerState::Uninitialized {
            self.setup()?;
        }
        self.end_requested = true;
        self.pump()
    }

    /// Release the output and end the buffer if it can still be ended.
    ///
    /// Every step is guarded independently; calling this in any state, or
    /// more than once, never fails.
    pub fn cleanup(&mut self) {
        if self.state == ReassemblerState::Closed {
            return;
        }

        if self.state != ReassemblerState::Uninitialized {
            if let Err(e) = self.output.stop_recording() {
                log::warn!("Failed to stop output recording: {}", e);
            }
            if let Err(e) = self.output.disconnect() {
                log::warn!("Failed to disconnect audio graph: {}", e);
            }
            if let Err(e) = self.output.close() {
                log::warn!("Failed to close output context: {}", e);
            }

            if self.buffer.ready_state() == BufferReadyState::Open && !self.buffer.is_updating() {
                if let Err(e) = self.buffer.end_of_stream() {
                    log::warn!("Failed to end media buffer: {}", e);
                }
            } else {
                log::debug!("Media buffer not appendable, leaving it as is");
            }
        }

        if !self.pending.is_empty() {
            log::debug!("Discarding {} queued chunks on cleanup", self.pending.len());
        }
        self.pending.clear();
        self.state = ReassemblerState::Closed;
    }

    /// Tear playback down and prepare the same buffer for a new stream.
    ///
    /// Runs `cleanup`, resets the buffer and returns to `Uninitialized`, so
    /// the next chunk re-attaches the output and starts a fresh buffer.
    pub fn restart(&mut self) -> Result<(), RelayError> {
        self.cleanup();
        self.buffer.reset()?;
        self.end_requested = false;
        self.state = ReassemblerState::Uninitialized;
        self.diagnostics.restarts += 1;
        log::debug!("Playback restarted for a new stream");
        Ok(())
    }

    pub fn state(&self) -> ReassemblerState {
        self.state
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn diagnostics(&self) -> ReassemblerDiagnostics {
        self.diagnostics.clone()
    }

    fn pump(&mut self) -> Result<(), RelayError> {
        loop {
            match self.buffer.ready_state() {
                BufferReadyState::Ended => {
                    if !self.pending.is_empty() {
                        log::warn!(
                            "Media buffer ended with {} chunks still queued",
                            self.pending.len()
                        );
                        self.diagnostics.discarded_after_end += self.pending.len() as u64;
                        self.pending.clear();
                    }
                    self.state = ReassemblerState::Ended;
                    return Ok(());
                }
                BufferReadyState::Closed => {
                    self.state = self.idle_or_waiting();
                    return Ok(());
                }
                BufferReadyState::Open => {}
            }

            if self.buffer.is_updating() {
                self.state = if self.pending.is_empty() {
                    ReassemblerState::Appending
                } else {
                    ReassemblerState::Waiting
                };
                return Ok(());
            }

            let Some(chunk) = self.pending.pop_front() else {
                if self.end_requested {
                    self.buffer.end_of_stream()?;
                    self.state = ReassemblerState::Ended;
                    log::debug!("Playback stream ended");
                } else {
                    self.state = ReassemblerState::Open;
                }
                return Ok(());
            };

            self.resume_output();

            match self.buffer.append(chunk.as_bytes()) {
                Ok(()) => {
                    self.diagnostics.chunks_appended += 1;
                    self.diagnostics.bytes_appended += chunk.len() as u64;
                    self.state = ReassemblerState::Appending;
                }
                Err(RelayError::BufferContention) => {
                    self.diagnostics.contention_retries += 1;
                    self.pending.push_front(chunk);
                    self.state = ReassemblerState::Waiting;
                    return Ok(());
                }
                Err(e) => {
                    self.pending.push_front(chunk);
                    return Err(e);
                }
            }
        }
    }

    fn idle_or_waiting(&self) -> ReassemblerState {
        if self.pending.is_empty() {
            ReassemblerState::Open
        } else {
            ReassemblerState::Waiting
        }
    }

    /// A suspended output stalls after an underrun; wake it before appending.
    fn resume_output(&mut self) {
        if !self.output.is_suspended() {
            return;
        }
        match self.output.resume() {
            Ok(()) => self.diagnostics.output_resumes += 1,
            Err(e) => log::warn!("Failed to resume playback output: {}", e),
        }
    }
}

impl<B: MediaBuffer, O: PlaybackOutput> Drop for PlaybackReassembler<B, O> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
