use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::models::error::RelayError;
use crate::models::source::SourceHandle;
use crate::session::relay::{RelayEvent, RelayHandle};
use crate::traits::source_inspector::SourceInspector;

/// Result of one title poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitlePoll {
    Unchanged,
    Changed(String),
    Gone,
}

/// Compare the source's current title against the last one seen.
pub fn poll_title(inspector: &dyn SourceInspector, source_id: &str, last_title: &str) -> TitlePoll {
    match inspector.title(source_id) {
        None => TitlePoll::Gone,
        Some(title) if title == last_title => TitlePoll::Unchanged,
        Some(title) => TitlePoll::Changed(title),
    }
}

/// Background poller reporting title changes of the captured source.
///
/// Lives exactly as long as the capture session that owns it.
pub struct TitleWatcher {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TitleWatcher {
    pub fn spawn(
        source: &SourceHandle,
        inspector: Arc<dyn SourceInspector>,
        interval: Duration,
        events: RelayHandle,
    ) -> Result<Self, RelayError> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let source_id = source.id.clone();
        let mut last_title = source.title.clone();

        let handle = thread::Builder::new()
            .name("title-watcher".into())
            .spawn(move || {
                let mut deadline = Instant::now() + interval;
                loop {
                    loop {
                        if !flag.load(Ordering::SeqCst) {
                            return;
                        }
                        let now = Instant::now();
                        if now >= deadline {
                            break;
                        }
                        thread::park_timeout(deadline - now);
                    }
                    deadline = Instant::now() + interval;

                    let event = match poll_title(inspector.as_ref(), &source_id, &last_title) {
                        TitlePoll::Unchanged => continue,
                        TitlePoll::Changed(title) => {
                            log::debug!("Source {} title changed to {:?}", source_id, title);
                            last_title = title.clone();
                            RelayEvent::TitleChanged {
                                source_id: source_id.clone(),
                                title,
                            }
                        }
                        TitlePoll::Gone => {
                            log::info!("Source {} no longer exists", source_id);
                            let _ = events.send(RelayEvent::SourceVanished(source_id.clone()));
                            return;
                        }
                    };

                    if events.send(event).is_err() {
                        return;
                    }
                }
            })
            .map_err(|e| RelayError::AcquisitionFailed(format!("failed to spawn title watcher: {}", e)))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop polling and join the thread. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for TitleWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
