//! # audio-relay-loopback
//!
//! In-process backend for audio-relay.
//!
//! Provides:
//! - `SourceDirectory`: registry of open sources (tabs) with titles, close
//!   and navigation events
//! - `ToneSourceAcquirer`: synthetic sine-tone streams for directory sources
//! - `InProcessPort`: mpsc-backed consumer channel
//! - `MemoryMediaBuffer` / `MemoryOutput`: consumer playback buffer in memory
//!
//! ## Usage
//! ```ignore
//! use audio_relay_core::{AudioRelay, RelayConfiguration};
//! use audio_relay_loopback::{SourceDirectory, ToneSourceAcquirer};
//!
//! let directory = SourceDirectory::new();
//! let acquirer = ToneSourceAcquirer::new(directory.clone());
//! let mut relay = AudioRelay::with_pcm_codec(Box::new(acquirer), RelayConfiguration::default())?;
//! relay.set_inspector(std::sync::Arc::new(directory.clone()));
//! ```

pub mod channel_port;
pub mod memory_buffer;
pub mod source_directory;
pub mod tone_source;

pub use channel_port::InProcessPort;
pub use memory_buffer::{MemoryMediaBuffer, MemoryOutput};
pub use source_directory::SourceDirectory;
pub use tone_source::{ToneSourceAcquirer, ToneStream};
