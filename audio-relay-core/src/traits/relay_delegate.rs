use crate::models::error::RelayError;
use crate::models::source::SourceHandle;
use crate::models::state::{CaptureStatus, StatusIndicator};

/// Event delegate for relay notifications.
///
/// Called from the thread that owns the relay. Implementations should
/// marshal to a UI thread if needed.
pub trait RelayDelegate: Send + Sync {
    /// Called when the capture status or the indicator changes.
    fn on_status_changed(&self, status: CaptureStatus, indicator: StatusIndicator);

    /// Called when the polled title of the captured source changes.
    fn on_title_changed(&self, source: &SourceHandle);

    /// Called when a terminal error ends a capture session.
    fn on_error(&self, error: &RelayError);
}
