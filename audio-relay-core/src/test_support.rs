//! Fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::chunk::EncodedChunk;
use crate::models::error::RelayError;
use crate::models::message::RelayMessage;
use crate::models::source::SourceHandle;
use crate::models::state::{CaptureStatus, StatusIndicator};
use crate::traits::chunk_codec::ChunkCodec;
use crate::traits::consumer_port::ConsumerPort;
use crate::traits::media_buffer::{BufferReadyState, MediaBuffer, PlaybackOutput};
use crate::traits::media_source::{AudioBufferCallback, AudioStream, MediaSourceAcquirer};
use crate::traits::relay_delegate::RelayDelegate;
use crate::traits::source_inspector::SourceInspector;

// -- Codecs --

/// Emits a one-byte chunk numbering each non-empty encode, starting at 1.
pub struct ScriptedCodec {
    counter: u8,
}

impl ScriptedCodec {
    pub fn new() -> Self {
        Self { counter: 0 }
    }
}

impl ChunkCodec for ScriptedCodec {
    fn mime_type(&self) -> &str {
        "application/octet-stream"
    }

    fn encode(&mut self, samples: &[f32], _sample_rate: f64, _channels: u16) -> Result<Vec<u8>, RelayError> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        self.counter = self.counter.wrapping_add(1);
        Ok(vec![self.counter])
    }

    fn reset(&mut self) {}
}

pub struct FailingCodec;

impl ChunkCodec for FailingCodec {
    fn mime_type(&self) -> &str {
        "application/octet-stream"
    }

    fn encode(&mut self, _samples: &[f32], _sample_rate: f64, _channels: u16) -> Result<Vec<u8>, RelayError> {
        Err(RelayError::EncodingFailed("scripted failure".into()))
    }

    fn reset(&mut self) {}
}

// -- Consumer ports --

pub struct RecordingPort {
    name: String,
    messages: Mutex<Vec<RelayMessage>>,
    connected: AtomicBool,
}

impl RecordingPort {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            messages: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        })
    }

    pub fn chunks(&self) -> Vec<EncodedChunk> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| m.as_chunk().cloned())
            .collect()
    }

    pub fn messages(&self) -> Vec<RelayMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.as_chunk().is_none())
            .cloned()
            .collect()
    }

    /// Every later post fails with `ChannelGone`.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl ConsumerPort for RecordingPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn post(&self, message: &RelayMessage) -> Result<(), RelayError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RelayError::ChannelGone(self.name.clone()));
        }
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

// -- Playback --

pub type EventLog = Arc<Mutex<Vec<&'static str>>>;

/// Media buffer whose updates finish only when the test says so.
pub struct FakeBuffer {
    events: EventLog,
    ready: BufferReadyState,
    updating: bool,
    reject_next: bool,
    appended: Vec<Vec<u8>>,
    rejected: usize,
    ended: bool,
}

impl FakeBuffer {
    pub fn new() -> Self {
        Self::with_log(Arc::new(Mutex::new(Vec::new())))
    }

    fn with_log(events: EventLog) -> Self {
        Self {
            events,
            ready: BufferReadyState::Open,
            updating: false,
            reject_next: false,
            appended: Vec::new(),
            rejected: 0,
            ended: false,
        }
    }

    pub fn close(&mut self) {
        self.ready = BufferReadyState::Closed;
    }

    pub fn open(&mut self) {
        self.ready = BufferReadyState::Open;
    }

    pub fn finish_update(&mut self) {
        self.updating = false;
    }

    /// Make the next append fail with contention even though idle.
    pub fn reject_next_append(&mut self) {
        self.reject_next = true;
    }

    pub fn appended(&self) -> Vec<Vec<u8>> {
        self.appended.clone()
    }

    /// Appends attempted while an update was still running.
    pub fn rejected_appends(&self) -> usize {
        self.rejected
    }

    pub fn ended(&self) -> bool {
        self.ended
    }
}

impl MediaBuffer for FakeBuffer {
    fn ready_state(&self) -> BufferReadyState {
        self.ready
    }

    fn is_updating(&self) -> bool {
        self.updating
    }

    fn append(&mut self, data: &[u8]) -> Result<(), RelayError> {
        if self.reject_next {
            self.reject_next = false;
            return Err(RelayError::BufferContention);
        }
        if self.updating {
            self.rejected += 1;
            return Err(RelayError::BufferContention);
        }
        if self.ready != BufferReadyState::Open {
            return Err(RelayError::InvalidState("buffer not open".into()));
        }
        self.events.lock().push("append");
        self.appended.push(data.to_vec());
        self.updating = true;
        Ok(())
    }

    fn end_of_stream(&mut self) -> Result<(), RelayError> {
        if self.updating || self.ready != BufferReadyState::Open {
            return Err(RelayError::InvalidState("buffer cannot end now".into()));
        }
        self.ready = BufferReadyState::Ended;
        self.ended = true;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), RelayError> {
        self.events.lock().push("reset");
        self.ready = BufferReadyState::Open;
        self.updating = false;
        self.appended.clear();
        self.ended = false;
        Ok(())
    }
}

pub struct FakeOutput {
    events: EventLog,
    suspended: bool,
    fail_teardown: bool,
    recording_stopped: bool,
    disconnected: bool,
    closed: bool,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self::with_log(Arc::new(Mutex::new(Vec::new())))
    }

    fn with_log(events: EventLog) -> Self {
        Self {
            events,
            suspended: false,
            fail_teardown: false,
            recording_stopped: false,
            disconnected: false,
            closed: false,
        }
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Every teardown step fails from now on.
    pub fn fail_teardown(&mut self) {
        self.fail_teardown = true;
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    pub fn recording_stopped(&self) -> bool {
        self.recording_stopped
    }

    pub fn disconnected(&self) -> bool {
        self.disconnected
    }

    fn teardown_step(&self) -> Result<(), RelayError> {
        if self.fail_teardown {
            Err(RelayError::InvalidState("output already released".into()))
        } else {
            Ok(())
        }
    }
}

impl PlaybackOutput for FakeOutput {
    fn attach(&mut self) -> Result<(), RelayError> {
        self.events.lock().push("attach");
        self.closed = false;
        Ok(())
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) -> Result<(), RelayError> {
        self.suspended = false;
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), RelayError> {
        self.teardown_step()?;
        self.recording_stopped = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), RelayError> {
        self.teardown_step()?;
        self.disconnected = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), RelayError> {
        self.teardown_step()?;
        self.closed = true;
        Ok(())
    }
}

/// A buffer and output sharing one event log.
pub fn fake_playback() -> (FakeBuffer, FakeOutput, EventLog) {
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));
    (
        FakeBuffer::with_log(Arc::clone(&events)),
        FakeOutput::with_log(Arc::clone(&events)),
        events,
    )
}

// -- Capture sources --

pub struct MockStreamState {
    callback: Mutex<Option<AudioBufferCallback>>,
    stopped: AtomicBool,
}

/// Test-side control over what `MockAcquirer` hands out.
pub struct MockSource {
    acquisitions: AtomicUsize,
    track_count: AtomicUsize,
    fail_next: Mutex<Option<RelayError>>,
    streams: Mutex<Vec<Arc<MockStreamState>>>,
}

impl MockSource {
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, error: RelayError) {
        *self.fail_next.lock() = Some(error);
    }

    pub fn set_track_count(&self, count: usize) {
        self.track_count.store(count, Ordering::SeqCst);
    }

    /// Feed stereo samples through the newest running stream.
    pub fn push(&self, samples: &[f32]) {
        let stream = self.streams.lock().last().cloned();
        if let Some(stream) = stream {
            if stream.stopped.load(Ordering::SeqCst) {
                return;
            }
            let callback = stream.callback.lock().clone();
            if let Some(callback) = callback {
                callback(samples, 48000.0, 2);
            }
        }
    }

    /// Streams acquired and not yet stopped.
    pub fn live_streams(&self) -> usize {
        self.streams
            .lock()
            .iter()
            .filter(|s| !s.stopped.load(Ordering::SeqCst))
            .count()
    }
}

pub struct MockAcquirer {
    source: Arc<MockSource>,
}

impl MockAcquirer {
    pub fn new() -> Self {
        Self {
            source: Arc::new(MockSource {
                acquisitions: AtomicUsize::new(0),
                track_count: AtomicUsize::new(1),
                fail_next: Mutex::new(None),
                streams: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn control(&self) -> Arc<MockSource> {
        Arc::clone(&self.source)
    }
}

impl MediaSourceAcquirer for MockAcquirer {
    fn acquire(&mut self, _source: &SourceHandle) -> Result<Box<dyn AudioStream>, RelayError> {
        self.source.acquisitions.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.source.fail_next.lock().take() {
            return Err(error);
        }
        let state = Arc::new(MockStreamState {
            callback: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });
        self.source.streams.lock().push(Arc::clone(&state));
        Ok(Box::new(MockStream {
            state,
            tracks: self.source.track_count.load(Ordering::SeqCst),
        }))
    }
}

struct MockStream {
    state: Arc<MockStreamState>,
    tracks: usize,
}

impl AudioStream for MockStream {
    fn audio_track_count(&self) -> usize {
        self.tracks
    }

    fn start_track(&mut self, index: usize, callback: AudioBufferCallback) -> Result<(), RelayError> {
        if index >= self.tracks {
            return Err(RelayError::NoAudioTrack);
        }
        *self.state.callback.lock() = Some(callback);
        Ok(())
    }

    fn stop_all_tracks(&mut self) {
        self.state.stopped.store(true, Ordering::SeqCst);
        *self.state.callback.lock() = None;
    }

    fn is_live(&self) -> bool {
        !self.state.stopped.load(Ordering::SeqCst)
    }
}

// -- Delegate and inspector --

#[derive(Default)]
pub struct RecordingDelegate {
    pub statuses: Mutex<Vec<(CaptureStatus, StatusIndicator)>>,
    pub titles: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<RelayError>>,
}

impl RelayDelegate for RecordingDelegate {
    fn on_status_changed(&self, status: CaptureStatus, indicator: StatusIndicator) {
        self.statuses.lock().push((status, indicator));
    }

    fn on_title_changed(&self, source: &SourceHandle) {
        self.titles.lock().push(source.title.clone());
    }

    fn on_error(&self, error: &RelayError) {
        self.errors.lock().push(error.clone());
    }
}

#[derive(Default)]
pub struct StaticInspector {
    titles: Mutex<HashMap<String, String>>,
}

impl StaticInspector {
    pub fn with_source(id: &str, title: &str) -> Arc<Self> {
        let inspector = Self::default();
        inspector.set_title(id, title);
        Arc::new(inspector)
    }

    pub fn set_title(&self, id: &str, title: &str) {
        self.titles.lock().insert(id.to_string(), title.to_string());
    }

    pub fn remove(&self, id: &str) {
        self.titles.lock().remove(id);
    }
}

impl SourceInspector for StaticInspector {
    fn title(&self, source_id: &str) -> Option<String> {
        self.titles.lock().get(source_id).cloned()
    }
}
