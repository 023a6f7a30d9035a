use std::sync::mpsc;
use std::sync::Arc;

use parking_lot::Mutex;

use audio_relay_core::models::error::RelayError;
use audio_relay_core::models::message::RelayMessage;
use audio_relay_core::traits::consumer_port::ConsumerPort;

/// Consumer channel backed by an in-process mpsc queue.
///
/// The consumer side holds the `Receiver`; dropping it makes every later
/// `post` fail with `ChannelGone`.
pub struct InProcessPort {
    name: String,
    tx: Mutex<Option<mpsc::Sender<RelayMessage>>>,
}

impl InProcessPort {
    /// Open a channel named `name`, returning the producer port and the
    /// consumer's receiving end.
    pub fn open(name: impl Into<String>) -> (Arc<Self>, mpsc::Receiver<RelayMessage>) {
        let (tx, rx) = mpsc::channel();
        let port = Arc::new(Self {
            name: name.into(),
            tx: Mutex::new(Some(tx)),
        });
        (port, rx)
    }

    /// Close from the producer side.
    pub fn close(&self) {
        self.tx.lock().take();
    }
}

impl ConsumerPort for InProcessPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn post(&self, message: &RelayMessage) -> Result<(), RelayError> {
        let tx = self.tx.lock();
        let sender = tx
            .as_ref()
            .ok_or_else(|| RelayError::ChannelGone(self.name.clone()))?;
        sender
            .send(message.clone())
            .map_err(|_| RelayError::ChannelGone(self.name.clone()))
    }
}
