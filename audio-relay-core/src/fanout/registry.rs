use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::chunk::EncodedChunk;
use crate::models::consumer::{ConnectionState, ConsumerId};
use crate::models::error::RelayError;
use crate::models::message::RelayMessage;
use crate::traits::consumer_port::ConsumerPort;

/// One registered consumer: its port plus a connection gate.
///
/// Delivery and closing both take the gate lock, so once `close` returns no
/// message can reach the port.
pub struct ConsumerChannel {
    id: ConsumerId,
    port: Arc<dyn ConsumerPort>,
    state: Mutex<ConnectionState>,
    delivered: AtomicU64,
}

impl ConsumerChannel {
    fn new(id: ConsumerId, port: Arc<dyn ConsumerPort>) -> Self {
        Self {
            id,
            port,
            state: Mutex::new(ConnectionState::Connected),
            delivered: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &ConsumerId {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Messages successfully posted to this consumer.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    fn deliver(&self, message: &RelayMessage) -> Result<(), RelayError> {
        let state = self.state.lock();
        if *state == ConnectionState::Disconnected {
            return Err(RelayError::ChannelGone(self.id.to_string()));
        }
        self.port.post(message)?;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn close(&self) {
        *self.state.lock() = ConnectionState::Disconnected;
    }
}

/// Outcome of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Consumers whose port failed; they have been removed from the registry.
    pub dropped: Vec<ConsumerId>,
}

/// Counters for debugging the fanout.
#[derive(Debug, Clone, Default)]
pub struct FanoutDiagnostics {
    pub broadcasts: u64,
    pub deliveries: u64,
    pub channels_gone: u64,
    pub registrations: u64,
}

/// Registry of connected consumers with snapshot-on-broadcast delivery.
///
/// Register and unregister may run at any time, from any thread, while a
/// broadcast is in flight: the broadcast iterates a snapshot taken under the
/// registry lock and delivers outside it.
pub struct TransportFanout {
    channels: Mutex<BTreeMap<ConsumerId, Arc<ConsumerChannel>>>,
    diagnostics: Mutex<FanoutDiagnostics>,
}

impl TransportFanout {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(BTreeMap::new()),
            diagnostics: Mutex::new(FanoutDiagnostics::default()),
        }
    }

    /// Register a consumer. A channel already registered under the same id is
    /// closed and replaced.
    pub fn register(&self, id: ConsumerId, port: Arc<dyn ConsumerPort>) {
        self.insert(Arc::new(ConsumerChannel::new(id, port)));
    }

    /// Register a consumer whose first message must be `init`.
    ///
    /// `init` is posted before the channel becomes visible to broadcasts. If
    /// the port rejects it the consumer is not registered.
    pub fn register_with_init(
        &self,
        id: ConsumerId,
        port: Arc<dyn ConsumerPort>,
        init: &RelayMessage,
    ) -> Result<(), RelayError> {
        let channel = Arc::new(ConsumerChannel::new(id.clone(), port));
        if let Err(e) = channel.deliver(init) {
            log::warn!("Consumer {} rejected its stream init: {}", id, e);
            self.diagnostics.lock().channels_gone += 1;
            return Err(RelayError::ChannelGone(id.to_string()));
        }
        self.insert(channel);
        Ok(())
    }

    fn insert(&self, channel: Arc<ConsumerChannel>) {
        let id = channel.id().clone();
        let previous = self.channels.lock().insert(id.clone(), channel);
        if let Some(previous) = previous {
            log::debug!("Consumer {} reconnected, replacing its channel", id);
            previous.close();
        }
        self.diagnostics.lock().registrations += 1;
        log::info!("Consumer {} registered", id);
    }

    /// Remove a consumer. Returns whether it was registered.
    pub fn unregister(&self, id: &ConsumerId) -> bool {
        let removed = self.channels.lock().remove(id);
        match removed {
            Some(channel) => {
                channel.close();
                log::info!("Consumer {} unregistered", id);
                true
            }
            None => false,
        }
    }

    /// Deliver the identical chunk to every registered consumer.
    pub fn broadcast(&self, chunk: &EncodedChunk) -> BroadcastReport {
        self.broadcast_message(&RelayMessage::Chunk(chunk.clone()))
    }

    /// Deliver one message to every registered consumer.
    pub fn broadcast_message(&self, message: &RelayMessage) -> BroadcastReport {
        let snapshot: Vec<Arc<ConsumerChannel>> = self.channels.lock().values().cloned().collect();

        let mut report = BroadcastReport::default();
        for channel in snapshot {
            match channel.deliver(message) {
                Ok(()) => report.delivered += 1,
                Err(RelayError::ChannelGone(_)) if channel.state() == ConnectionState::Disconnected => {
                    // Unregistered after the snapshot was taken
                }
                Err(e) => {
                    log::warn!("Dropping consumer {}: {}", channel.id(), e);
                    self.remove_if_current(&channel);
                    report.dropped.push(channel.id().clone());
                }
            }
        }

        let mut d = self.diagnostics.lock();
        d.broadcasts += 1;
        d.deliveries += report.delivered as u64;
        d.channels_gone += report.dropped.len() as u64;
        report
    }

    /// Send a message to one consumer only.
    ///
    /// A failing port is removed from the registry and reported as `ChannelGone`.
    pub fn send_to(&self, id: &ConsumerId, message: &RelayMessage) -> Result<(), RelayError> {
        let channel = self
            .channels
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::ChannelGone(id.to_string()))?;

        channel.deliver(message).map_err(|e| {
            log::warn!("Dropping consumer {}: {}", id, e);
            self.remove_if_current(&channel);
            self.diagnostics.lock().channels_gone += 1;
            RelayError::ChannelGone(id.to_string())
        })
    }

    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }

    pub fn contains(&self, id: &ConsumerId) -> bool {
        self.channels.lock().contains_key(id)
    }

    pub fn consumer_ids(&self) -> Vec<ConsumerId> {
        self.channels.lock().keys().cloned().collect()
    }

    pub fn diagnostics(&self) -> FanoutDiagnostics {
        self.diagnostics.lock().clone()
    }

    /// Remove `channel` unless a newer registration replaced it meanwhile.
    fn remove_if_current(&self, channel: &Arc<ConsumerChannel>) {
        let mut channels = self.channels.lock();
        if channels
            .get(channel.id())
            .is_some_and(|current| Arc::ptr_eq(current, channel))
        {
            channels.remove(channel.id());
        }
        channel.close();
    }
}

impl Default for TransportFanout {
    fn default() -> Self {
        Self::new()
    }
}
