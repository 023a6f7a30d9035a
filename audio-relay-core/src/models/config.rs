use std::time::Duration;

use serde::Deserialize;

use super::error::RelayError;

/// How the chunk encoder is clocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderDrive {
    /// The encoder owns a timer thread ticking every `chunk_interval_ms`.
    #[default]
    Thread,
    /// The host calls `tick()` from its own platform timer.
    External,
}

/// Configuration for an audio relay.
///
/// Every field has a default, so hosts may deserialize a partial JSON object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelayConfiguration {
    /// Encoder cadence in milliseconds (default: 20).
    pub chunk_interval_ms: u64,

    /// Sample rate of encoded output in Hz (default: 48000).
    pub sample_rate: f64,

    /// Channel count of encoded output (default: 2). Valid values: 1, 2.
    pub channels: u16,

    /// Seconds of input audio the sample ring holds before dropping the oldest.
    /// The ring is sized from the capture stream's own rate and channel count.
    pub sample_buffer_secs: f64,

    /// Source title poll interval in milliseconds (default: 1000, min: 100).
    pub title_poll_interval_ms: u64,

    /// Prefix of consumer channel names; the rest of the name is the consumer id.
    pub consumer_channel_prefix: String,

    /// Start the encoder as soon as a stream and a consumer both exist.
    pub auto_record: bool,

    /// Tear capture down when the last consumer disconnects.
    pub reclaim_when_idle: bool,

    /// Queued chunk count above which a consumer logs a backlog warning.
    pub pending_warn_chunks: usize,

    pub encoder_drive: EncoderDrive,
}

impl RelayConfiguration {
    pub const MIN_TITLE_POLL_MS: u64 = 100;
    pub const MIN_SAMPLE_RATE: f64 = 8000.0;
    pub const MAX_SAMPLE_RATE: f64 = 384000.0;
    pub const MAX_SAMPLE_BUFFER_SECS: f64 = 60.0;

    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_interval_ms == 0 {
            return Err("chunk interval must be positive".into());
        }
        if !(Self::MIN_SAMPLE_RATE..=Self::MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(format!(
                "sample rate must be between {} and {} Hz, got {}",
                Self::MIN_SAMPLE_RATE,
                Self::MAX_SAMPLE_RATE,
                self.sample_rate
            ));
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if !(self.sample_buffer_secs > 0.0 && self.sample_buffer_secs <= Self::MAX_SAMPLE_BUFFER_SECS) {
            return Err(format!(
                "sample buffer must hold between 0 and {}s of audio",
                Self::MAX_SAMPLE_BUFFER_SECS
            ));
        }
        if self.title_poll_interval_ms < Self::MIN_TITLE_POLL_MS {
            return Err(format!(
                "title poll interval must be at least {}ms",
                Self::MIN_TITLE_POLL_MS
            ));
        }
        if self.consumer_channel_prefix.is_empty() {
            return Err("consumer channel prefix must not be empty".into());
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, RelayError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RelayError::ConfigurationFailed(format!("invalid configuration: {}", e)))?;
        config.validate().map_err(RelayError::ConfigurationFailed)?;
        Ok(config)
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }

    pub fn title_poll_interval(&self) -> Duration {
        Duration::from_millis(self.title_poll_interval_ms)
    }
}

impl Default for RelayConfiguration {
    fn default() -> Self {
        Self {
            chunk_interval_ms: 20,
            sample_rate: 48000.0,
            channels: 2,
            sample_buffer_secs: 5.0,
            title_poll_interval_ms: 1000,
            consumer_channel_prefix: "target-tab-".into(),
            auto_record: true,
            reclaim_when_idle: true,
            pending_warn_chunks: 50,
            encoder_drive: EncoderDrive::Thread,
        }
    }
}
