//! 16-bit PCM helpers for the default chunk codec.
//!
//! Produces a WAV RIFF header usable at the start of an open-ended stream,
//! converts between f32 and little-endian i16, and reshapes interleaved
//! audio (resampling and channel remixing).

use crate::models::error::RelayError;

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Data-size value used when the stream length is unknown.
pub const STREAMING_DATA_SIZE: u32 = u32::MAX;

/// Generate a 44-byte PCM WAV header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size (saturating)
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16
/// [20-21]  1 (PCM)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate
/// [32-33]  block_align
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
///
/// Fails if the byte rate or block alignment does not fit the header fields.
pub fn wav_header(
    sample_rate: u32,
    bit_depth: u16,
    channels: u16,
    data_size: u32,
) -> Result<[u8; WAV_HEADER_SIZE], RelayError> {
    let byte_rate = sample_rate
        .checked_mul(channels as u32)
        .and_then(|v| v.checked_mul(bit_depth as u32))
        .map(|v| v / 8)
        .ok_or_else(|| {
            RelayError::EncodingFailed(format!(
                "WAV byte rate overflows: {}Hz/{}ch/{}bit",
                sample_rate, channels, bit_depth
            ))
        })?;
    let block_align = channels
        .checked_mul(bit_depth)
        .map(|v| v / 8)
        .ok_or_else(|| {
            RelayError::EncodingFailed(format!("WAV block align overflows: {}ch/{}bit", channels, bit_depth))
        })?;
    let chunk_size = data_size.saturating_add(36);

    let mut header = [0u8; WAV_HEADER_SIZE];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    Ok(header)
}

/// Header for a 16-bit stream of unknown length.
pub fn streaming_wav_header(sample_rate: u32, channels: u16) -> Result<[u8; WAV_HEADER_SIZE], RelayError> {
    wav_header(sample_rate, 16, channels, STREAMING_DATA_SIZE)
}

/// Convert f32 samples `[-1.0, 1.0]` to 16-bit little-endian PCM, clamping.
pub fn f32_to_i16_le(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

/// Convert 16-bit little-endian PCM back to f32. A trailing odd byte is ignored.
pub fn i16_le_to_f32(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
        .collect()
}

/// Linear-interpolation resampler for one continuous interleaved stream.
///
/// The fractional read position and the last input frame carry over from one
/// `process` call to the next, so packet boundaries neither drop nor repeat
/// frames. The newest frame is held back until the frame after it arrives.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    channels: usize,
    source_rate: f64,
    target_rate: f64,
    position: f64,
    previous: Vec<f32>,
}

impl StreamResampler {
    pub fn new(channels: usize, source_rate: f64, target_rate: f64) -> Self {
        Self {
            channels,
            source_rate,
            target_rate,
            position: 0.0,
            previous: Vec::new(),
        }
    }

    /// Whether this resampler was built for input at `source_rate`.
    pub fn accepts(&self, source_rate: f64) -> bool {
        (self.source_rate - source_rate).abs() < 0.01
    }

    pub fn is_passthrough(&self) -> bool {
        (self.source_rate - self.target_rate).abs() < 0.01
    }

    /// Resample the next packet of the stream. Trailing partial frames are ignored.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let channels = self.channels;
        if channels == 0 || samples.is_empty() || self.is_passthrough() {
            return samples.to_vec();
        }

        let whole = samples.len() - samples.len() % channels;
        let mut frames = Vec::with_capacity(self.previous.len() + whole);
        frames.extend_from_slice(&self.previous);
        frames.extend_from_slice(&samples[..whole]);

        let frame_count = frames.len() / channels;
        if frame_count == 0 {
            return Vec::new();
        }

        let step = self.source_rate / self.target_rate;
        let mut output = Vec::with_capacity((frame_count as f64 / step) as usize * channels + channels);
        while (self.position as usize) + 1 < frame_count {
            let index = self.position as usize;
            let fraction = (self.position - index as f64) as f32;
            let current = &frames[index * channels..(index + 1) * channels];
            let next = &frames[(index + 1) * channels..(index + 2) * channels];
            output.extend(
                current
                    .iter()
                    .zip(next)
                    .map(|(a, b)| a * (1.0 - fraction) + b * fraction),
            );
            self.position += step;
        }

        // Rebase on the held-back frame
        self.position -= (frame_count - 1) as f64;
        self.previous = frames[(frame_count - 1) * channels..].to_vec();
        output
    }

    /// Forget the carried phase and frame, as at the start of a new stream.
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.previous.clear();
    }
}

/// Convert interleaved audio between channel counts.
///
/// Mono output averages all channels; mono input is duplicated; wider input
/// keeps its first `target` channels.
pub fn remix_channels(samples: &[f32], source: usize, target: usize) -> Vec<f32> {
    if source == target || source == 0 || target == 0 {
        return samples.to_vec();
    }
    let frame_count = samples.len() / source;
    let mut output = Vec::with_capacity(frame_count * target);
    for frame in samples.chunks_exact(source) {
        if target == 1 {
            output.push(frame.iter().sum::<f32>() / source as f32);
        } else if source == 1 {
            output.extend(std::iter::repeat(frame[0]).take(target));
        } else {
            for ch in 0..target {
                output.push(if ch < source { frame[ch] } else { 0.0 });
            }
        }
    }
    output
}

/// Root-mean-square level, 0.0 for empty input.
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}
