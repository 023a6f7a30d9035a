/// Read-only metadata lookup for capture sources.
///
/// Platforms that cannot push title-change events are polled through this
/// trait by the session's title watcher.
pub trait SourceInspector: Send + Sync {
    /// Current title of the source, or `None` if the source no longer exists.
    fn title(&self, source_id: &str) -> Option<String>;
}
