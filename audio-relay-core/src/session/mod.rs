pub mod capture_session;
pub mod relay;
pub mod title_watcher;
