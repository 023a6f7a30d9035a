use crate::models::config::RelayConfiguration;
use crate::models::error::RelayError;
use crate::processing::pcm::{self, StreamResampler};
use crate::traits::chunk_codec::ChunkCodec;

/// Default chunk codec: 16-bit little-endian PCM.
///
/// The first chunk of a stream starts with a streaming WAV header, so a
/// consumer can append every chunk to one contiguous buffer as-is.
///
/// ```text
/// chunk 1: [44-byte WAV header, data size 0xFFFFFFFF] [PCM]
/// chunk n: [PCM]
/// ```
///
/// Consumers that join after chunk 1 get the same header from
/// `stream_header()` before their first chunk.
#[derive(Debug, Clone)]
pub struct PcmChunkCodec {
    target_rate: f64,
    target_channels: u16,
    header: [u8; pcm::WAV_HEADER_SIZE],
    header_sent: bool,
    resampler: Option<StreamResampler>,
}

impl PcmChunkCodec {
    pub const MIME_TYPE: &'static str = "audio/wav";

    pub fn new(target_rate: f64, target_channels: u16) -> Result<Self, RelayError> {
        let rates = RelayConfiguration::MIN_SAMPLE_RATE..=RelayConfiguration::MAX_SAMPLE_RATE;
        if !rates.contains(&target_rate) {
            return Err(RelayError::EncodingFailed(format!(
                "unsupported output sample rate: {}",
                target_rate
            )));
        }
        if ![1, 2].contains(&target_channels) {
            return Err(RelayError::EncodingFailed(format!(
                "unsupported output channel count: {}",
                target_channels
            )));
        }
        Ok(Self {
            target_rate,
            target_channels,
            header: pcm::streaming_wav_header(target_rate as u32, target_channels)?,
            header_sent: false,
            resampler: None,
        })
    }

    pub fn from_config(config: &RelayConfiguration) -> Result<Self, RelayError> {
        Self::new(config.sample_rate, config.channels)
    }
}

impl ChunkCodec for PcmChunkCodec {
    fn mime_type(&self) -> &str {
        Self::MIME_TYPE
    }

    fn encode(&mut self, samples: &[f32], sample_rate: f64, channels: u16) -> Result<Vec<u8>, RelayError> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        if channels == 0 || sample_rate <= 0.0 {
            return Err(RelayError::EncodingFailed(format!(
                "invalid input format: {}Hz/{}ch",
                sample_rate, channels
            )));
        }

        let target_channels = self.target_channels as usize;
        let remixed = pcm::remix_channels(samples, channels as usize, target_channels);
        if !self.resampler.as_ref().is_some_and(|r| r.accepts(sample_rate)) {
            self.resampler = Some(StreamResampler::new(target_channels, sample_rate, self.target_rate));
        }
        let resampled = match self.resampler.as_mut() {
            Some(resampler) => resampler.process(&remixed),
            None => remixed,
        };
        if resampled.is_empty() {
            return Ok(Vec::new());
        }

        let body = pcm::f32_to_i16_le(&resampled);
        if self.header_sent {
            return Ok(body);
        }

        let mut data = Vec::with_capacity(pcm::WAV_HEADER_SIZE + body.len());
        data.extend_from_slice(&self.header);
        data.extend_from_slice(&body);
        self.header_sent = true;
        Ok(data)
    }

    fn stream_header(&self) -> Option<Vec<u8>> {
        self.header_sent.then(|| self.header.to_vec())
    }

    fn reset(&mut self) {
        self.header_sent = false;
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }
}
