use crate::models::config::RelayConfiguration;

/// Bounded circular buffer between a stream callback and the chunk encoder.
///
/// Holds interleaved f32 samples in a single stream format. Wrap in
/// `Arc<parking_lot::Mutex<SampleRing>>` for cross-thread access.
///
/// Overflow drops the oldest whole frames and counts them. A format change
/// discards whatever is buffered, since it can no longer be interpreted.
#[derive(Debug)]
pub struct SampleRing {
    buffer: Vec<f32>,
    write_index: usize,
    read_index: usize,
    available: usize,
    capacity: usize,
    /// When set, capacity follows the stream format and holds this many seconds.
    duration_secs: Option<f64>,
    sample_rate: f64,
    channels: u16,
    dropped: u64,
}

impl SampleRing {
    /// Widest frame a duration-sized ring allocates for; wider streams get
    /// proportionally less time.
    pub const MAX_SIZED_CHANNELS: u16 = 32;

    /// Ring with a fixed capacity in interleaved samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: vec![0.0; capacity],
            write_index: 0,
            read_index: 0,
            available: 0,
            capacity,
            duration_secs: None,
            sample_rate: 0.0,
            channels: 1,
            dropped: 0,
        }
    }

    /// Ring holding `secs` of audio in whatever format the stream delivers.
    ///
    /// Storage is allocated on the first write and again on each format change.
    pub fn with_duration(secs: f64) -> Self {
        Self {
            duration_secs: Some(secs),
            ..Self::new(1)
        }
    }

    /// Interleaved capacity currently allocated.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append interleaved samples delivered at `sample_rate` with `channels`.
    pub fn write(&mut self, samples: &[f32], sample_rate: f64, channels: u16) {
        if samples.is_empty() || channels == 0 {
            return;
        }

        if channels != self.channels || (sample_rate - self.sample_rate).abs() > 0.01 {
            if self.available > 0 {
                log::debug!(
                    "Stream format changed to {}Hz/{}ch, discarding {} buffered samples",
                    sample_rate,
                    channels,
                    self.available
                );
                self.dropped += self.available as u64;
            }
            self.reset();
            self.sample_rate = sample_rate;
            self.channels = channels;
            if let Some(secs) = self.duration_secs {
                self.resize_for_format(secs);
            }
        }

        let limit = self.frame_capacity();
        if limit == 0 {
            self.dropped += samples.len() as u64;
            return;
        }

        // Keep only the newest whole frames that fit
        let samples = if samples.len() > limit {
            self.dropped += (samples.len() - limit) as u64;
            &samples[samples.len() - limit..]
        } else {
            samples
        };

        let overflow = (self.available + samples.len()).saturating_sub(limit);
        if overflow > 0 {
            let frame = self.channels as usize;
            let overflow = overflow.div_ceil(frame) * frame;
            let overflow = overflow.min(self.available);
            self.read_index = (self.read_index + overflow) % self.capacity;
            self.available -= overflow;
            self.dropped += overflow as u64;
        }

        for &sample in samples {
            self.buffer[self.write_index] = sample;
            self.write_index = (self.write_index + 1) % self.capacity;
        }
        self.available += samples.len();
    }

    /// Remove and return everything buffered.
    pub fn drain(&mut self) -> Vec<f32> {
        let count = self.available;
        let mut result = Vec::with_capacity(count);
        for i in 0..count {
            result.push(self.buffer[(self.read_index + i) % self.capacity]);
        }
        self.read_index = (self.read_index + count) % self.capacity;
        self.available = 0;
        result
    }

    /// Number of samples currently buffered.
    pub fn count(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Format of the buffered samples as `(sample_rate, channels)`.
    pub fn format(&self) -> (f64, u16) {
        (self.sample_rate, self.channels)
    }

    /// Total samples discarded by overflow or format changes.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Discard buffered samples, keeping the drop counter.
    pub fn reset(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    fn resize_for_format(&mut self, secs: f64) {
        let rate = self.sample_rate.clamp(0.0, RelayConfiguration::MAX_SAMPLE_RATE);
        let frames = (rate * secs) as usize;
        let capacity = (frames * self.channels.min(Self::MAX_SIZED_CHANNELS) as usize).max(1);
        if capacity != self.capacity {
            self.buffer = vec![0.0; capacity];
            self.capacity = capacity;
        }
    }

    fn frame_capacity(&self) -> usize {
        let frame = self.channels.max(1) as usize;
        self.capacity - self.capacity % frame
    }
}
