use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::encoder::chunk_encoder::{ChunkSink, FailureCallback};
use crate::encoder::pcm_codec::PcmChunkCodec;
use crate::fanout::registry::TransportFanout;
use crate::models::config::RelayConfiguration;
use crate::models::consumer::ConsumerId;
use crate::models::error::RelayError;
use crate::models::message::{ControlMessage, ControlSelection, RelayMessage};
use crate::models::source::SourceHandle;
use crate::models::state::{CaptureStatus, StatusIndicator};
use crate::session::capture_session::CaptureSession;
use crate::session::title_watcher::TitleWatcher;
use crate::storage::selection::SelectionStore;
use crate::traits::chunk_codec::{ChunkCodec, CodecFactory};
use crate::traits::consumer_port::ConsumerPort;
use crate::traits::media_source::MediaSourceAcquirer;
use crate::traits::relay_delegate::RelayDelegate;
use crate::traits::source_inspector::SourceInspector;

/// Every input the relay reacts to.
pub enum RelayEvent {
    /// Operator picked a source and renderer.
    SelectionChanged(ControlSelection),
    SourceClosed(String),
    SourceNavigated(String),
    /// The title watcher could no longer resolve the source.
    SourceVanished(String),
    TitleChanged { source_id: String, title: String },
    /// A consumer opened a channel; its name carries the consumer id.
    ConsumerConnected(Arc<dyn ConsumerPort>),
    ConsumerDisconnected(ConsumerId),
    /// Consumers the fanout already removed because their port failed.
    ChannelsDropped(Vec<ConsumerId>),
    ConsumerMessage(ConsumerId, ControlMessage),
    StartRecording,
    /// One encode step for `EncoderDrive::External`.
    Tick,
    EncoderFailed { session_id: Uuid, error: RelayError },
    Stop,
}

impl RelayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectionChanged(_) => "selection-changed",
            Self::SourceClosed(_) => "source-closed",
            Self::SourceNavigated(_) => "source-navigated",
            Self::SourceVanished(_) => "source-vanished",
            Self::TitleChanged { .. } => "title-changed",
            Self::ConsumerConnected(_) => "consumer-connected",
            Self::ConsumerDisconnected(_) => "consumer-disconnected",
            Self::ChannelsDropped(_) => "channels-dropped",
            Self::ConsumerMessage(..) => "consumer-message",
            Self::StartRecording => "start-recording",
            Self::Tick => "tick",
            Self::EncoderFailed { .. } => "encoder-failed",
            Self::Stop => "stop",
        }
    }
}

/// Cloneable sender for posting events to a relay from other threads.
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayEvent>,
}

impl RelayHandle {
    pub fn new(tx: mpsc::Sender<RelayEvent>) -> Self {
        Self { tx }
    }

    pub fn send(&self, event: RelayEvent) -> Result<(), RelayError> {
        self.tx
            .send(event)
            .map_err(|_| RelayError::InvalidState("relay is gone".into()))
    }
}

/// Counters for debugging the lifecycle.
#[derive(Debug, Clone, Default)]
pub struct RelayDiagnostics {
    pub acquisitions: u64,
    pub acquisition_failures: u64,
    pub encoder_failures: u64,
    pub teardowns: u64,
    pub idle_reclamations: u64,
    pub not_ready_replies: u64,
    pub stream_resets: u64,
}

/// Capture lifecycle state machine.
///
/// ```text
/// Idle ──select──▶ Capturing ──consumer/start──▶ Recording
///   ▲                  │                              │
///   └── close / navigate / last consumer left / error ┘
/// ```
///
/// Owned by one thread and mutated only through `dispatch`. Timer threads
/// post into the same queue through a `RelayHandle`.
pub struct AudioRelay {
    config: RelayConfiguration,
    acquirer: Box<dyn MediaSourceAcquirer>,
    codec_factory: CodecFactory,
    fanout: Arc<TransportFanout>,
    session: Option<CaptureSession>,
    selection: Option<ControlSelection>,
    // Set by idle reclamation; the next consumer re-acquires the selection.
    resume_on_consumer: bool,
    status: CaptureStatus,
    indicator: StatusIndicator,
    last_error: Option<RelayError>,
    delegate: Option<Arc<dyn RelayDelegate>>,
    inspector: Option<Arc<dyn SourceInspector>>,
    store: Option<SelectionStore>,
    events_tx: mpsc::Sender<RelayEvent>,
    events_rx: mpsc::Receiver<RelayEvent>,
    diagnostics: RelayDiagnostics,
}

impl AudioRelay {
    pub fn new(
        acquirer: Box<dyn MediaSourceAcquirer>,
        codec_factory: CodecFactory,
        config: RelayConfiguration,
    ) -> Result<Self, RelayError> {
        config.validate().map_err(RelayError::ConfigurationFailed)?;
        let (events_tx, events_rx) = mpsc::channel();

        Ok(Self {
            config,
            acquirer,
            codec_factory,
            fanout: Arc::new(TransportFanout::new()),
            session: None,
            selection: None,
            resume_on_consumer: false,
            status: CaptureStatus::Idle,
            indicator: StatusIndicator::Idle,
            last_error: None,
            delegate: None,
            inspector: None,
            store: None,
            events_tx,
            events_rx,
            diagnostics: RelayDiagnostics::default(),
        })
    }

    /// Relay encoding with `PcmChunkCodec` at the configured format.
    pub fn with_pcm_codec(
        acquirer: Box<dyn MediaSourceAcquirer>,
        config: RelayConfiguration,
    ) -> Result<Self, RelayError> {
        let codec_config = config.clone();
        let factory: CodecFactory = Box::new(move || {
            let codec = PcmChunkCodec::from_config(&codec_config)?;
            Ok(Box::new(codec) as Box<dyn ChunkCodec>)
        });
        Self::new(acquirer, factory, config)
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn RelayDelegate>) {
        self.delegate = Some(delegate);
    }

    /// Resolve titles and watch for title changes through `inspector`.
    pub fn set_inspector(&mut self, inspector: Arc<dyn SourceInspector>) {
        self.inspector = Some(inspector);
    }

    pub fn set_selection_store(&mut self, store: SelectionStore) {
        self.store = Some(store);
    }

    pub fn handle(&self) -> RelayHandle {
        RelayHandle::new(self.events_tx.clone())
    }

    pub fn status(&self) -> CaptureStatus {
        self.status
    }

    pub fn indicator(&self) -> StatusIndicator {
        self.indicator
    }

    pub fn last_error(&self) -> Option<&RelayError> {
        self.last_error.as_ref()
    }

    pub fn consumer_count(&self) -> usize {
        self.fanout.len()
    }

    pub fn fanout(&self) -> &Arc<TransportFanout> {
        &self.fanout
    }

    pub fn selection(&self) -> Option<&ControlSelection> {
        self.selection.as_ref()
    }

    pub fn selected_renderer(&self) -> Option<&str> {
        self.selection.as_ref().map(|s| s.selected_renderer.as_str())
    }

    pub fn current_source(&self) -> Option<&SourceHandle> {
        self.session.as_ref().map(|s| s.source())
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id())
    }

    pub fn config(&self) -> &RelayConfiguration {
        &self.config
    }

    pub fn diagnostics(&self) -> RelayDiagnostics {
        self.diagnostics.clone()
    }

    /// Re-apply the persisted selection, if any. Returns whether one was found.
    pub fn restore(&mut self) -> Result<bool, RelayError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(false);
        };
        let Some(selection) = store.load()?.selection() else {
            return Ok(false);
        };
        log::info!("Restoring selection of source {}", selection.source_id);
        self.dispatch(RelayEvent::SelectionChanged(selection));
        Ok(true)
    }

    /// Dispatch every queued event without blocking. Returns how many ran.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for one event and dispatch it.
    pub fn process_next(&mut self, timeout: Duration) -> bool {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.dispatch(event);
                true
            }
            Err(_) => false,
        }
    }

    pub fn dispatch(&mut self, event: RelayEvent) {
        log::trace!("Relay event: {}", event.name());
        match event {
            RelayEvent::SelectionChanged(selection) => self.on_selection_changed(selection),
            RelayEvent::SourceClosed(id) => self.on_source_invalidated(&id, "closed"),
            RelayEvent::SourceNavigated(id) => self.on_source_invalidated(&id, "navigated away"),
            RelayEvent::SourceVanished(id) => self.on_source_invalidated(&id, "vanished"),
            RelayEvent::TitleChanged { source_id, title } => self.on_title_changed(&source_id, title),
            RelayEvent::ConsumerConnected(port) => self.on_consumer_connected(port),
            RelayEvent::ConsumerDisconnected(id) => {
                self.fanout.unregister(&id);
                self.reclaim_if_idle();
            }
            RelayEvent::ChannelsDropped(ids) => {
                log::debug!("{} consumer channels dropped", ids.len());
                self.reclaim_if_idle();
            }
            RelayEvent::ConsumerMessage(id, message) => self.on_consumer_message(&id, message),
            RelayEvent::StartRecording => self.start_recording(),
            RelayEvent::Tick => self.tick(),
            RelayEvent::EncoderFailed { session_id, error } => self.on_encoder_failed(session_id, error),
            RelayEvent::Stop => self.teardown(),
        }
    }

    /// Operator stop: release the capture and forget the selection.
    /// Safe in any state, any number of times.
    pub fn teardown(&mut self) {
        self.teardown_session();
        self.selection = None;
        self.resume_on_consumer = false;
        self.set_status(CaptureStatus::Idle, StatusIndicator::Idle);
    }

    // --- Transitions ---

    fn on_selection_changed(&mut self, selection: ControlSelection) {
        if self.session.is_some() && self.selection.as_ref() == Some(&selection) {
            log::debug!("Selection unchanged, keeping session");
            return;
        }

        log::info!(
            "Selected source {} (renderer {:?})",
            selection.source_id,
            selection.selected_renderer
        );
        self.teardown_session();
        self.persist(|store| store.save_selection(&selection, None));
        self.selection = Some(selection);
        self.resume_on_consumer = false;
        self.last_error = None;
        self.acquire_selected();
    }

    fn acquire_selected(&mut self) {
        let Some(selection) = self.selection.clone() else {
            return;
        };

        let source = match self.resolve_source(&selection.source_id) {
            Some(source) => source,
            None => {
                self.diagnostics.acquisition_failures += 1;
                self.fail(RelayError::SourceGone);
                return;
            }
        };

        let codec = match (self.codec_factory)() {
            Ok(codec) => codec,
            Err(e) => {
                self.fail(match e {
                    RelayError::EncodingFailed(_) => e,
                    other => RelayError::EncodingFailed(other.to_string()),
                });
                return;
            }
        };

        let mut session = match CaptureSession::acquire(self.acquirer.as_mut(), source, codec, &self.config) {
            Ok(session) => session,
            Err(e) => {
                self.diagnostics.acquisition_failures += 1;
                self.fail(e);
                return;
            }
        };
        self.diagnostics.acquisitions += 1;

        if let Some(inspector) = self.inspector.as_ref() {
            match TitleWatcher::spawn(
                session.source(),
                Arc::clone(inspector),
                self.config.title_poll_interval(),
                self.handle(),
            ) {
                Ok(watcher) => session.attach_watcher(watcher),
                Err(e) => log::warn!("Title watcher unavailable: {}", e),
            }
        }

        let title = session.source().title.clone();
        self.persist(|store| store.update_title(&title));
        self.session = Some(session);
        self.set_status(CaptureStatus::Capturing, StatusIndicator::Capturing);

        if self.config.auto_record && !self.fanout.is_empty() {
            self.start_recording();
        }
    }

    fn resolve_source(&self, source_id: &str) -> Option<SourceHandle> {
        match self.inspector.as_ref() {
            Some(inspector) => inspector
                .title(source_id)
                .map(|title| SourceHandle::new(source_id, title)),
            None => Some(SourceHandle::new(source_id, source_id)),
        }
    }

    fn start_recording(&mut self) {
        let Some(session_id) = self.session_id() else {
            log::debug!("No captured stream to record");
            return;
        };
        if self.session.as_ref().is_some_and(|s| s.is_recording()) {
            return;
        }

        let fanout = Arc::clone(&self.fanout);
        let events = self.handle();
        let sink: ChunkSink = Arc::new(move |chunk| {
            let report = fanout.broadcast(&chunk);
            if !report.dropped.is_empty() {
                let _ = events.send(RelayEvent::ChannelsDropped(report.dropped));
            }
        });

        let events = self.handle();
        let on_failure: FailureCallback = Arc::new(move |error| {
            let _ = events.send(RelayEvent::EncoderFailed { session_id, error });
        });

        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.start_recording(sink, on_failure) {
            Ok(()) => self.set_status(CaptureStatus::Recording, StatusIndicator::Capturing),
            Err(RelayError::InvalidState(reason)) => {
                log::warn!("Cannot start recording: {}", reason);
            }
            Err(e) => self.fail(e),
        }
    }

    fn tick(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let session_id = session.id();
        if let Err(e) = session.tick() {
            // The queued EncoderFailed for this session is ignored later
            self.on_encoder_failed(session_id, e);
        }
    }

    fn on_encoder_failed(&mut self, session_id: Uuid, error: RelayError) {
        if self.session_id() != Some(session_id) {
            log::debug!("Ignoring failure of stale session {}", session_id);
            return;
        }
        self.diagnostics.encoder_failures += 1;
        self.fail(error);
    }

    fn on_source_invalidated(&mut self, source_id: &str, reason: &str) {
        let selected = self
            .selection
            .as_ref()
            .is_some_and(|s| s.source_id == source_id);
        if !selected {
            log::debug!("Ignoring event for unselected source {}", source_id);
            return;
        }

        log::info!("Source {} {}, releasing capture", source_id, reason);
        if let Some(session) = self.session.as_mut() {
            session.invalidate_source();
        }
        self.teardown_session();
        self.selection = None;
        self.resume_on_consumer = false;
        self.persist(|store| store.clear_source());
        self.set_status(CaptureStatus::Idle, StatusIndicator::Idle);
    }

    fn on_title_changed(&mut self, source_id: &str, title: String) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.source().id != source_id {
            return;
        }
        session.set_title(title.clone());
        if let Some(delegate) = self.delegate.as_ref() {
            delegate.on_title_changed(session.source());
        }
        self.persist(|store| store.update_title(&title));
    }

    fn on_consumer_connected(&mut self, port: Arc<dyn ConsumerPort>) {
        let prefix = &self.config.consumer_channel_prefix;
        let Some(id) = ConsumerId::from_channel_name(port.name(), prefix) else {
            log::warn!("Ignoring channel {:?} without the {:?} prefix", port.name(), prefix);
            return;
        };

        if let Some(session) = self.session.as_ref().filter(|s| s.is_recording()) {
            // Joining mid-stream: the header goes first, ahead of any chunk
            let fanout = &self.fanout;
            let joined = session.with_stream_header(|header| match header {
                Some(header) => fanout.register_with_init(id.clone(), port, &RelayMessage::Chunk(header)),
                None => {
                    fanout.register(id.clone(), port);
                    Ok(())
                }
            });
            if let Err(e) = joined {
                log::warn!("Consumer {} left before its first chunk: {}", id, e);
            }
            return;
        }

        self.fanout.register(id, port);
        if self.session.is_some() {
            if self.config.auto_record {
                self.start_recording();
            }
        } else if self.resume_on_consumer && self.selection.is_some() {
            log::info!("Consumer returned, acquiring a fresh stream");
            self.resume_on_consumer = false;
            self.acquire_selected();
        }
    }

    fn on_consumer_message(&mut self, id: &ConsumerId, message: ControlMessage) {
        match message {
            ControlMessage::RequestAudio => {
                if !self.fanout.contains(id) {
                    log::debug!("Ignoring audio request from unregistered consumer {}", id);
                    return;
                }
                if self.status.is_recording() {
                    log::debug!("Consumer {} requested audio; already streaming", id);
                    return;
                }
                self.diagnostics.not_ready_replies += 1;
                if let Err(e) = self.fanout.send_to(id, &RelayMessage::not_ready()) {
                    log::warn!("Could not answer consumer {}: {}", id, e);
                    self.reclaim_if_idle();
                }
            }
            ControlMessage::AudioNotReady | ControlMessage::StreamReset => {
                log::warn!("Unexpected {:?} from consumer {}", message, id);
            }
        }
    }

    // --- Helpers ---

    /// Idle reclamation: release the capture once the last consumer left.
    fn reclaim_if_idle(&mut self) {
        if !self.config.reclaim_when_idle || self.session.is_none() || !self.fanout.is_empty() {
            return;
        }
        log::info!("No consumers left, releasing capture");
        self.teardown_session();
        self.resume_on_consumer = true;
        self.diagnostics.idle_reclamations += 1;
        self.set_status(CaptureStatus::Idle, StatusIndicator::Idle);
    }

    /// Terminal failure: release everything and show the error indicator.
    fn fail(&mut self, error: RelayError) {
        log::error!("Capture failed: {}", error);
        self.teardown_session();
        self.resume_on_consumer = false;
        self.last_error = Some(error.clone());
        self.set_status(CaptureStatus::Idle, StatusIndicator::Error);
        if let Some(delegate) = self.delegate.as_ref() {
            delegate.on_error(&error);
        }
    }

    /// Release the current session. Consumers that received any of its
    /// chunks are told the stream ended, so the next chunk they see (with
    /// its own header) lands in a fresh buffer.
    fn teardown_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.teardown();
        self.diagnostics.teardowns += 1;

        if session.encoder_diagnostics().chunks_emitted == 0 || self.fanout.is_empty() {
            return;
        }
        let report = self.fanout.broadcast_message(&RelayMessage::stream_reset());
        self.diagnostics.stream_resets += 1;
        log::debug!(
            "Stream reset sent to {} consumers ({} dropped)",
            report.delivered,
            report.dropped.len()
        );
    }

    fn set_status(&mut self, status: CaptureStatus, indicator: StatusIndicator) {
        if self.status == status && self.indicator == indicator {
            return;
        }
        log::debug!("Relay {:?} → {:?} ({})", self.status, status, indicator.color());
        self.status = status;
        self.indicator = indicator;
        if let Some(delegate) = self.delegate.as_ref() {
            delegate.on_status_changed(status, indicator);
        }
    }

    fn persist(&self, write: impl FnOnce(&SelectionStore) -> Result<(), RelayError>) {
        if let Some(store) = self.store.as_ref() {
            if let Err(e) = write(store) {
                log::warn!("Failed to persist selection: {}", e);
            }
        }
    }
}

impl Drop for AudioRelay {
    fn drop(&mut self) {
        self.teardown_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chunk::EncodedChunk;
    use crate::models::config::EncoderDrive;
    use crate::processing::pcm;
    use crate::test_support::{
        FailingCodec, MockAcquirer, MockSource, RecordingDelegate, RecordingPort, ScriptedCodec,
        StaticInspector,
    };

    fn config() -> RelayConfiguration {
        RelayConfiguration {
            encoder_drive: EncoderDrive::External,
            ..Default::default()
        }
    }

    fn relay_with(config: RelayConfiguration) -> (AudioRelay, Arc<MockSource>) {
        let acquirer = MockAcquirer::new();
        let source = acquirer.control();
        let factory: CodecFactory = Box::new(|| Ok(Box::new(ScriptedCodec::new()) as Box<dyn ChunkCodec>));
        let relay = AudioRelay::new(Box::new(acquirer), factory, config).unwrap();
        (relay, source)
    }

    fn relay() -> (AudioRelay, Arc<MockSource>) {
        relay_with(config())
    }

    fn select(relay: &mut AudioRelay, source_id: &str) {
        relay.dispatch(RelayEvent::SelectionChanged(ControlSelection::new(source_id, "bars")));
    }

    fn connect(relay: &mut AudioRelay, id: &str) -> Arc<RecordingPort> {
        let port = RecordingPort::new(&format!("target-tab-{}", id));
        relay.dispatch(RelayEvent::ConsumerConnected(port.clone()));
        port
    }

    /// Push audio and run one encoder step.
    fn produce(relay: &mut AudioRelay, source: &MockSource) {
        source.push(&[0.2, 0.2, 0.2, 0.2]);
        relay.dispatch(RelayEvent::Tick);
        relay.process_pending();
    }

    fn numbered(range: std::ops::RangeInclusive<u8>) -> Vec<EncodedChunk> {
        range.map(|n| EncodedChunk::from(vec![n])).collect()
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let factory: CodecFactory = Box::new(|| Ok(Box::new(ScriptedCodec::new()) as Box<dyn ChunkCodec>));
        let config = RelayConfiguration {
            chunk_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            AudioRelay::new(Box::new(MockAcquirer::new()), factory, config),
            Err(RelayError::ConfigurationFailed(_))
        ));
    }

    #[test]
    fn selection_acquires_and_first_consumer_starts_recording() {
        let (mut relay, source) = relay();
        select(&mut relay, "1");
        assert_eq!(relay.status(), CaptureStatus::Capturing);
        assert_eq!(relay.indicator().color(), "blue");
        assert_eq!(source.acquisitions(), 1);

        connect(&mut relay, "a");
        assert_eq!(relay.status(), CaptureStatus::Recording);
    }

    #[test]
    fn selection_with_consumers_goes_straight_to_recording() {
        let (mut relay, _source) = relay();
        connect(&mut relay, "a");
        assert_eq!(relay.status(), CaptureStatus::Idle);

        select(&mut relay, "1");
        assert_eq!(relay.status(), CaptureStatus::Recording);
    }

    #[test]
    fn every_consumer_receives_every_chunk_in_order() {
        let (mut relay, source) = relay();
        select(&mut relay, "1");
        let ports: Vec<_> = ["a", "b", "c"].iter().map(|id| connect(&mut relay, id)).collect();

        for _ in 0..6 {
            produce(&mut relay, &source);
        }

        for port in &ports {
            assert_eq!(port.chunks(), numbered(1..=6));
        }
    }

    #[test]
    fn late_consumer_gets_only_later_chunks() {
        let (mut relay, source) = relay();
        select(&mut relay, "1");
        let early = connect(&mut relay, "early");
        produce(&mut relay, &source);
        produce(&mut relay, &source);

        let late = connect(&mut relay, "late");
        produce(&mut relay, &source);

        assert_eq!(early.chunks(), numbered(1..=3));
        assert_eq!(late.chunks(), numbered(3..=3));
    }

    #[test]
    fn disconnect_mid_stream_stops_only_that_consumer() {
        let (mut relay, source) = relay();
        select(&mut relay, "1");
        let a = connect(&mut relay, "a");
        let b = connect(&mut relay, "b");

        for _ in 0..3 {
            produce(&mut relay, &source);
        }
        relay.dispatch(RelayEvent::ConsumerDisconnected(ConsumerId::new("a")));
        for _ in 0..2 {
            produce(&mut relay, &source);
        }

        assert_eq!(a.chunks(), numbered(1..=3));
        assert_eq!(b.chunks(), numbered(1..=5));
        assert_eq!(relay.status(), CaptureStatus::Recording);
    }

    #[test]
    fn last_consumer_leaving_reclaims_and_return_reacquires_fresh() {
        let (mut relay, source) = relay();
        select(&mut relay, "1");
        connect(&mut relay, "a");
        let first_session = relay.session_id();

        relay.dispatch(RelayEvent::ConsumerDisconnected(ConsumerId::new("a")));
        assert_eq!(relay.status(), CaptureStatus::Idle);
        assert_eq!(relay.indicator(), StatusIndicator::Idle);
        assert_eq!(source.live_streams(), 0);
        assert!(relay.selection().is_some(), "selection kept for the next consumer");

        let port = connect(&mut relay, "a");
        assert_eq!(source.acquisitions(), 2);
        assert_eq!(source.live_streams(), 1);
        assert_ne!(relay.session_id(), first_session);
        assert_eq!(relay.status(), CaptureStatus::Recording);

        produce(&mut relay, &source);
        assert_eq!(port.chunks(), numbered(1..=1), "new session, new encoder");
        assert_eq!(relay.diagnostics().idle_reclamations, 1);
    }

    #[test]
    fn failed_port_is_dropped_and_triggers_reclamation() {
        let (mut relay, source) = relay();
        select(&mut relay, "1");
        let port = connect(&mut relay, "a");
        produce(&mut relay, &source);

        port.disconnect();
        produce(&mut relay, &source);

        assert_eq!(relay.consumer_count(), 0);
        assert_eq!(relay.status(), CaptureStatus::Idle);
        assert_eq!(source.live_streams(), 0);
    }

    #[test]
    fn request_audio_while_capturing_gets_one_not_ready() {
        let (mut relay, _source) = relay_with(RelayConfiguration {
            auto_record: false,
            ..config()
        });
        select(&mut relay, "1");
        let a = connect(&mut relay, "a");
        let b = connect(&mut relay, "b");
        assert_eq!(relay.status(), CaptureStatus::Capturing);

        relay.dispatch(RelayEvent::ConsumerMessage(ConsumerId::new("a"), ControlMessage::RequestAudio));

        assert_eq!(a.messages(), vec![RelayMessage::not_ready()]);
        assert!(a.chunks().is_empty());
        assert!(b.messages().is_empty());
        assert_eq!(relay.status(), CaptureStatus::Capturing);

        relay.dispatch(RelayEvent::StartRecording);
        assert_eq!(relay.status(), CaptureStatus::Recording);
        relay.dispatch(RelayEvent::ConsumerMessage(ConsumerId::new("a"), ControlMessage::RequestAudio));
        assert_eq!(a.messages().len(), 1, "no reply while streaming");
    }

    #[test]
    fn request_from_unregistered_consumer_has_no_effect() {
        let (mut relay, source) = relay();
        select(&mut relay, "1");
        assert_eq!(relay.status(), CaptureStatus::Capturing);

        relay.dispatch(RelayEvent::ConsumerMessage(ConsumerId::new("ghost"), ControlMessage::RequestAudio));

        assert_eq!(relay.status(), CaptureStatus::Capturing);
        assert_eq!(source.live_streams(), 1);
        assert_eq!(relay.diagnostics().idle_reclamations, 0);
        assert_eq!(relay.diagnostics().not_ready_replies, 0);
    }

    #[test]
    fn late_consumer_of_pcm_stream_gets_header_first() {
        let acquirer = MockAcquirer::new();
        let source = acquirer.control();
        let mut relay = AudioRelay::with_pcm_codec(Box::new(acquirer), config()).unwrap();
        select(&mut relay, "1");
        let early = connect(&mut relay, "early");
        produce(&mut relay, &source);
        produce(&mut relay, &source);

        let late = connect(&mut relay, "late");
        produce(&mut relay, &source);

        let early_chunks = early.chunks();
        let late_chunks = late.chunks();
        assert_eq!(early_chunks.len(), 3);
        assert_eq!(late_chunks.len(), 2);
        assert_eq!(&late_chunks[0].as_bytes()[..4], b"RIFF");
        assert_eq!(late_chunks[0].as_bytes(), &early_chunks[0].as_bytes()[..pcm::WAV_HEADER_SIZE]);
        assert_eq!(late_chunks[1], early_chunks[2], "no replay of earlier audio");
    }

    #[test]
    fn consumer_joining_before_first_chunk_gets_no_extra_header() {
        let acquirer = MockAcquirer::new();
        let source = acquirer.control();
        let mut relay = AudioRelay::with_pcm_codec(Box::new(acquirer), config()).unwrap();
        select(&mut relay, "1");
        connect(&mut relay, "a");
        let b = connect(&mut relay, "b");
        produce(&mut relay, &source);

        let chunks = b.chunks();
        assert_eq!(chunks.len(), 1);
        assert_eq!(&chunks[0].as_bytes()[..4], b"RIFF");
    }

    #[test]
    fn source_switch_resets_consumer_streams() {
        let (mut relay, source) = relay();
        select(&mut relay, "1");
        let port = connect(&mut relay, "a");
        produce(&mut relay, &source);

        select(&mut relay, "2");
        produce(&mut relay, &source);

        assert_eq!(port.messages(), vec![RelayMessage::stream_reset()]);
        // Each session numbers its chunks from 1
        assert_eq!(port.chunks(), vec![EncodedChunk::from(vec![1]), EncodedChunk::from(vec![1])]);
        assert_eq!(relay.diagnostics().stream_resets, 1);

        select(&mut relay, "1");
        assert_eq!(relay.diagnostics().stream_resets, 2);
        // Nothing was sent from this session, so consumers keep their buffer
        select(&mut relay, "2");
        assert_eq!(relay.diagnostics().stream_resets, 2);
    }

    #[test]
    fn navigation_returns_to_idle_and_requests_get_not_ready() {
        let (mut relay, source) = relay();
        select(&mut relay, "1");
        let port = connect(&mut relay, "a");
        produce(&mut relay, &source);

        relay.dispatch(RelayEvent::SourceNavigated("1".into()));
        assert_eq!(relay.status(), CaptureStatus::Idle);
        assert!(relay.selection().is_none());
        assert_eq!(source.live_streams(), 0);

        relay.dispatch(RelayEvent::ConsumerMessage(ConsumerId::new("a"), ControlMessage::RequestAudio));
        assert_eq!(
            port.messages(),
            vec![RelayMessage::stream_reset(), RelayMessage::not_ready()]
        );
        assert_eq!(source.acquisitions(), 1, "requests never start a capture");

        connect(&mut relay, "b");
        assert_eq!(source.acquisitions(), 1, "stale selection is not resumed");
    }

    #[test]
    fn events_for_other_sources_are_ignored() {
        let (mut relay, _source) = relay();
        select(&mut relay, "1");
        relay.dispatch(RelayEvent::SourceClosed("2".into()));
        assert_eq!(relay.status(), CaptureStatus::Capturing);
    }

    #[test]
    fn switching_source_tears_down_the_previous_stream_first() {
        let (mut relay, source) = relay();
        select(&mut relay, "1");
        select(&mut relay, "2");

        assert_eq!(source.acquisitions(), 2);
        assert_eq!(source.live_streams(), 1);
        assert_eq!(relay.current_source().map(|s| s.id.as_str()), Some("2"));

        // Same selection again keeps the session
        let selection = relay.selection().cloned().unwrap();
        relay.dispatch(RelayEvent::SelectionChanged(selection));
        assert_eq!(source.acquisitions(), 2);
    }

    #[test]
    fn acquisition_failure_is_terminal_and_red() {
        let (mut relay, source) = relay();
        let delegate = Arc::new(RecordingDelegate::default());
        relay.set_delegate(delegate.clone());
        source.fail_next(RelayError::PermissionDenied);
        connect(&mut relay, "a");

        select(&mut relay, "1");
        assert_eq!(relay.status(), CaptureStatus::Idle);
        assert_eq!(relay.indicator().color(), "red");
        assert_eq!(relay.last_error(), Some(&RelayError::PermissionDenied));
        assert_eq!(delegate.errors.lock().as_slice(), &[RelayError::PermissionDenied]);

        // No automatic retry
        connect(&mut relay, "b");
        assert_eq!(source.acquisitions(), 1);

        // An explicit selection starts fresh
        select(&mut relay, "1");
        assert_eq!(relay.status(), CaptureStatus::Recording);
        assert_eq!(relay.indicator().color(), "blue");
    }

    #[test]
    fn encoder_failure_is_terminal_without_reacquire() {
        let acquirer = MockAcquirer::new();
        let source = acquirer.control();
        let factory: CodecFactory = Box::new(|| Ok(Box::new(FailingCodec) as Box<dyn ChunkCodec>));
        let mut relay = AudioRelay::new(Box::new(acquirer), factory, config()).unwrap();

        select(&mut relay, "1");
        let port = connect(&mut relay, "a");
        produce(&mut relay, &source);

        assert_eq!(relay.status(), CaptureStatus::Idle);
        assert_eq!(relay.indicator(), StatusIndicator::Error);
        assert!(matches!(relay.last_error(), Some(RelayError::EncodingFailed(_))));
        assert_eq!(relay.diagnostics().encoder_failures, 1);
        assert_eq!(source.live_streams(), 0);
        assert!(port.chunks().is_empty());

        relay.dispatch(RelayEvent::ConsumerDisconnected(ConsumerId::new("a")));
        connect(&mut relay, "a");
        assert_eq!(source.acquisitions(), 1);
    }

    #[test]
    fn codec_construction_failure_is_an_encoding_error() {
        let factory: CodecFactory = Box::new(|| Err(RelayError::ConfigurationFailed("no codec".into())));
        let mut relay = AudioRelay::new(Box::new(MockAcquirer::new()), factory, config()).unwrap();
        select(&mut relay, "1");
        assert!(matches!(relay.last_error(), Some(RelayError::EncodingFailed(_))));
    }

    #[test]
    fn teardown_twice_or_before_capture_is_noop() {
        let (mut relay, source) = relay();
        relay.teardown();
        relay.teardown();
        assert_eq!(relay.status(), CaptureStatus::Idle);

        select(&mut relay, "1");
        relay.dispatch(RelayEvent::Stop);
        relay.dispatch(RelayEvent::Stop);
        assert_eq!(relay.status(), CaptureStatus::Idle);
        assert_eq!(source.live_streams(), 0);
        assert_eq!(relay.diagnostics().teardowns, 1);
    }

    #[test]
    fn unknown_channel_names_are_not_registered() {
        let (mut relay, _source) = relay();
        relay.dispatch(RelayEvent::ConsumerConnected(RecordingPort::new("popup")));
        assert_eq!(relay.consumer_count(), 0);
    }

    #[test]
    fn title_changes_reach_the_delegate() {
        let (mut relay, _source) = relay();
        let delegate = Arc::new(RecordingDelegate::default());
        let inspector = StaticInspector::with_source("1", "Radio");
        relay.set_delegate(delegate.clone());
        relay.set_inspector(inspector);

        select(&mut relay, "1");
        assert_eq!(relay.current_source().map(|s| s.title.as_str()), Some("Radio"));

        relay.dispatch(RelayEvent::TitleChanged {
            source_id: "1".into(),
            title: "Radio - Live".into(),
        });
        assert_eq!(relay.current_source().map(|s| s.title.as_str()), Some("Radio - Live"));
        assert_eq!(delegate.titles.lock().as_slice(), &["Radio - Live".to_string()]);
    }

    #[test]
    fn watcher_reports_vanished_source() {
        let (mut relay, source) = relay_with(RelayConfiguration {
            title_poll_interval_ms: 100,
            ..config()
        });
        let inspector = StaticInspector::with_source("1", "Radio");
        relay.set_inspector(inspector.clone());
        select(&mut relay, "1");

        inspector.remove("1");
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while relay.status() != CaptureStatus::Idle && std::time::Instant::now() < deadline {
            relay.process_next(Duration::from_millis(50));
        }
        assert_eq!(relay.status(), CaptureStatus::Idle);
        assert_eq!(source.live_streams(), 0);
    }

    #[test]
    fn unknown_source_fails_resolution() {
        let (mut relay, source) = relay();
        relay.set_inspector(Arc::new(StaticInspector::default()));
        select(&mut relay, "404");
        assert_eq!(relay.last_error(), Some(&RelayError::SourceGone));
        assert_eq!(source.acquisitions(), 0);
    }

    #[test]
    fn status_changes_are_reported_once_each() {
        let (mut relay, _source) = relay();
        let delegate = Arc::new(RecordingDelegate::default());
        relay.set_delegate(delegate.clone());

        select(&mut relay, "1");
        connect(&mut relay, "a");
        relay.dispatch(RelayEvent::Stop);

        assert_eq!(
            delegate.statuses.lock().as_slice(),
            &[
                (CaptureStatus::Capturing, StatusIndicator::Capturing),
                (CaptureStatus::Recording, StatusIndicator::Capturing),
                (CaptureStatus::Idle, StatusIndicator::Idle),
            ]
        );
    }

    #[test]
    fn selection_is_persisted_and_restored() {
        let dir = std::env::temp_dir().join(format!("audio_relay_restore_{}", Uuid::new_v4()));
        let path = dir.join("selection.json");

        {
            let (mut relay, _source) = relay();
            relay.set_selection_store(SelectionStore::new(&path));
            relay.set_inspector(StaticInspector::with_source("7", "Podcast"));
            select(&mut relay, "7");
        }

        let persisted = SelectionStore::new(&path).load().unwrap();
        assert_eq!(persisted.source_title.as_deref(), Some("Podcast"));

        let (mut relay, source) = relay();
        relay.set_selection_store(SelectionStore::new(&path));
        assert!(relay.restore().unwrap());
        assert_eq!(relay.selected_renderer(), Some("bars"));
        assert_eq!(source.acquisitions(), 1);

        relay.dispatch(RelayEvent::SourceClosed("7".into()));
        let cleared = SelectionStore::new(&path).load().unwrap();
        assert!(cleared.source_id.is_none());
        assert_eq!(cleared.selected_renderer.as_deref(), Some("bars"));

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn thread_drive_streams_to_consumers() {
        let (mut relay, source) = relay_with(RelayConfiguration {
            chunk_interval_ms: 5,
            ..Default::default()
        });
        select(&mut relay, "1");
        let port = connect(&mut relay, "a");

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while port.chunks().len() < 3 && std::time::Instant::now() < deadline {
            source.push(&[0.1, 0.1]);
            std::thread::sleep(Duration::from_millis(2));
        }
        relay.teardown();

        let chunks = port.chunks();
        assert!(chunks.len() >= 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.as_bytes()[0] as usize, i + 1);
        }
    }
}
