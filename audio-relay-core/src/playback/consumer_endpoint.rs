use crate::models::consumer::ConsumerId;
use crate::models::error::RelayError;
use crate::models::message::{ControlMessage, RelayMessage};
use crate::playback::reassembler::PlaybackReassembler;
use crate::traits::media_buffer::{MediaBuffer, PlaybackOutput};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub requests_sent: u64,
    pub chunks_received: u64,
    pub not_ready_replies: u64,
    pub stream_resets: u64,
}

/// Consumer half of a relay channel.
///
/// Owns the channel identity and the playback reassembler, and interprets
/// whatever arrives from the relay.
pub struct ConsumerEndpoint<B: MediaBuffer, O: PlaybackOutput> {
    id: ConsumerId,
    channel_name: String,
    reassembler: PlaybackReassembler<B, O>,
    stats: ConsumerStats,
}

impl<B: MediaBuffer, O: PlaybackOutput> ConsumerEndpoint<B, O> {
    pub fn new(id: ConsumerId, channel_prefix: &str, reassembler: PlaybackReassembler<B, O>) -> Self {
        let channel_name = id.channel_name(channel_prefix);
        Self {
            id,
            channel_name,
            reassembler,
            stats: ConsumerStats::default(),
        }
    }

    pub fn id(&self) -> &ConsumerId {
        &self.id
    }

    /// Name to open the channel with; the relay recovers our id from it.
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// Build the request sent right after connecting.
    pub fn request_audio(&mut self) -> ControlMessage {
        self.stats.requests_sent += 1;
        log::debug!("Consumer {} requesting audio", self.id);
        ControlMessage::RequestAudio
    }

    pub fn on_message(&mut self, message: RelayMessage) -> Result<(), RelayError> {
        match message {
            RelayMessage::Chunk(chunk) => {
                self.stats.chunks_received += 1;
                self.reassembler.on_chunk(chunk)
            }
            RelayMessage::Control(ControlMessage::AudioNotReady) => {
                self.stats.not_ready_replies += 1;
                log::warn!("Consumer {}: relay has no active capture", self.id);
                Ok(())
            }
            RelayMessage::Control(ControlMessage::StreamReset) => {
                self.stats.stream_resets += 1;
                log::info!("Consumer {}: stream restarted, rebuilding playback", self.id);
                self.reassembler.restart()
            }
            RelayMessage::Control(other) => {
                log::warn!("Consumer {}: ignoring unexpected {:?}", self.id, other);
                Ok(())
            }
        }
    }

    /// Forward the buffer's update-finished event.
    pub fn on_buffer_ready(&mut self) -> Result<(), RelayError> {
        self.reassembler.on_buffer_ready()
    }

    /// Tear down playback. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.reassembler.cleanup();
    }

    pub fn reassembler(&self) -> &PlaybackReassembler<B, O> {
        &self.reassembler
    }

    pub fn reassembler_mut(&mut self) -> &mut PlaybackReassembler<B, O> {
        &mut self.reassembler
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }
}
