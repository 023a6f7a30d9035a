//! Registry of open capture sources, the loopback stand-in for browser tabs.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use audio_relay_core::models::source::SourceHandle;
use audio_relay_core::session::relay::{RelayEvent, RelayHandle};
use audio_relay_core::traits::source_inspector::SourceInspector;

#[derive(Debug, Clone)]
struct SourceEntry {
    title: String,
    frequency: f32,
    // Bumped on navigation; streams of an older generation are stale
    generation: u64,
    blocked: bool,
    muted: bool,
}

#[derive(Default)]
struct DirectoryState {
    sources: BTreeMap<String, SourceEntry>,
    listeners: Vec<RelayHandle>,
}

/// Shared, cloneable directory of sources.
///
/// Closing or navigating a source notifies every watching relay with
/// `SourceClosed` / `SourceNavigated`.
#[derive(Clone, Default)]
pub struct SourceDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

/// What a tone stream needs to know about its source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ToneSpec {
    pub frequency: f32,
    pub generation: u64,
    pub muted: bool,
}

impl SourceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a source playing a tone at `frequency` Hz.
    pub fn open(&self, id: &str, title: &str, frequency: f32) -> SourceHandle {
        self.state.lock().sources.insert(
            id.to_string(),
            SourceEntry {
                title: title.to_string(),
                frequency,
                generation: 0,
                blocked: false,
                muted: false,
            },
        );
        log::debug!("Source {} opened ({:?}, {}Hz)", id, title, frequency);
        SourceHandle::new(id, title)
    }

    pub fn rename(&self, id: &str, title: &str) -> bool {
        match self.state.lock().sources.get_mut(id) {
            Some(entry) => {
                entry.title = title.to_string();
                true
            }
            None => false,
        }
    }

    /// Close a source. Watching relays get `SourceClosed`.
    pub fn close(&self, id: &str) -> bool {
        let listeners = {
            let mut state = self.state.lock();
            if state.sources.remove(id).is_none() {
                return false;
            }
            state.listeners.clone()
        };
        log::debug!("Source {} closed", id);
        notify(&listeners, || RelayEvent::SourceClosed(id.to_string()));
        true
    }

    /// Navigate a source to new content; its live streams become stale.
    pub fn navigate(&self, id: &str, title: &str) -> bool {
        let listeners = {
            let mut state = self.state.lock();
            let Some(entry) = state.sources.get_mut(id) else {
                return false;
            };
            entry.generation += 1;
            entry.title = title.to_string();
            state.listeners.clone()
        };
        log::debug!("Source {} navigated to {:?}", id, title);
        notify(&listeners, || RelayEvent::SourceNavigated(id.to_string()));
        true
    }

    /// Refuse capture of this source, as if the user denied permission.
    pub fn block(&self, id: &str) {
        if let Some(entry) = self.state.lock().sources.get_mut(id) {
            entry.blocked = true;
        }
    }

    /// Deliver streams without any audio track.
    pub fn mute(&self, id: &str) {
        if let Some(entry) = self.state.lock().sources.get_mut(id) {
            entry.muted = true;
        }
    }

    /// Forward close and navigation events to a relay.
    pub fn watch(&self, relay: RelayHandle) {
        self.state.lock().listeners.push(relay);
    }

    pub fn list(&self) -> Vec<SourceHandle> {
        self.state
            .lock()
            .sources
            .iter()
            .map(|(id, entry)| SourceHandle::new(id.clone(), entry.title.clone()))
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().sources.contains_key(id)
    }

    pub(crate) fn is_blocked(&self, id: &str) -> bool {
        self.state.lock().sources.get(id).is_some_and(|e| e.blocked)
    }

    pub(crate) fn tone(&self, id: &str) -> Option<ToneSpec> {
        self.state.lock().sources.get(id).map(|e| ToneSpec {
            frequency: e.frequency,
            generation: e.generation,
            muted: e.muted,
        })
    }

    /// Whether a stream opened at `generation` still belongs to the source.
    pub(crate) fn is_current(&self, id: &str, generation: u64) -> bool {
        self.state
            .lock()
            .sources
            .get(id)
            .is_some_and(|e| e.generation == generation)
    }
}

fn notify(listeners: &[RelayHandle], event: impl Fn() -> RelayEvent) {
    for listener in listeners {
        if listener.send(event()).is_err() {
            log::debug!("Relay stopped listening to source events");
        }
    }
}

impl SourceInspector for SourceDirectory {
    fn title(&self, source_id: &str) -> Option<String> {
        self.state.lock().sources.get(source_id).map(|e| e.title.clone())
    }
}
