use crate::models::error::RelayError;
use crate::models::message::RelayMessage;

/// Producer end of a long-lived channel to one consumer context.
pub trait ConsumerPort: Send + Sync {
    /// Channel name as opened by the consumer (`"{prefix}{consumer id}"`).
    fn name(&self) -> &str;

    /// Deliver one message. `ChannelGone` means the consumer went away.
    fn post(&self, message: &RelayMessage) -> Result<(), RelayError>;
}
