use std::collections::VecDeque;

use crate::models::chunk::EncodedChunk;

/// FIFO of chunks waiting for the playback buffer to become ready.
///
/// Never drops: backpressure shows up as a growing backlog, reported once
/// per crossing of the warning threshold.
#[derive(Debug)]
pub struct PendingQueue {
    chunks: VecDeque<EncodedChunk>,
    bytes: usize,
    peak: usize,
    warn_threshold: usize,
    warned: bool,
}

impl PendingQueue {
    pub fn new(warn_threshold: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            bytes: 0,
            peak: 0,
            warn_threshold: warn_threshold.max(1),
            warned: false,
        }
    }

    pub fn push_back(&mut self, chunk: EncodedChunk) {
        self.bytes += chunk.len();
        self.chunks.push_back(chunk);
        self.peak = self.peak.max(self.chunks.len());

        if self.chunks.len() > self.warn_threshold && !self.warned {
            log::warn!(
                "Playback backlog of {} chunks ({} bytes); buffer is not keeping up",
                self.chunks.len(),
                self.bytes
            );
            self.warned = true;
        }
    }

    /// Put a chunk back at the head after a rejected append.
    pub fn push_front(&mut self, chunk: EncodedChunk) {
        self.bytes += chunk.len();
        self.chunks.push_front(chunk);
        self.peak = self.peak.max(self.chunks.len());
    }

    pub fn pop_front(&mut self) -> Option<EncodedChunk> {
        let chunk = self.chunks.pop_front()?;
        self.bytes -= chunk.len();
        if self.chunks.len() <= self.warn_threshold / 2 {
            self.warned = false;
        }
        Some(chunk)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total payload bytes queued.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Largest backlog seen.
    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.bytes = 0;
        self.warned = false;
    }
}
