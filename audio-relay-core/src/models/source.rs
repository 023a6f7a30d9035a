use serde::{Deserialize, Serialize};

/// A capture target (tab, window, or other platform source).
///
/// The title is best-effort: hosts that cannot push title changes are polled
/// by the session's title watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHandle {
    pub id: String,
    pub title: String,
    pub live: bool,
}

impl SourceHandle {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            live: true,
        }
    }

    /// Mark the handle stale; a stale handle must never be acquired again.
    pub fn invalidate(&mut self) {
        self.live = false;
    }
}
