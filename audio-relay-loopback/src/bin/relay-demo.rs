//! Relays two synthetic tabs to two in-process consumers.
//!
//! Run with `RUST_LOG=debug` to follow every lifecycle transition.

use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;

use audio_relay_core::playback::consumer_endpoint::ConsumerStats;
use audio_relay_core::processing::pcm;
use audio_relay_core::{
    AudioRelay, CaptureStatus, ConsumerEndpoint, ConsumerId, ControlSelection, PlaybackReassembler,
    RelayConfiguration, RelayDelegate, RelayError, RelayEvent, RelayHandle, SelectionStore, SourceHandle,
    StatusIndicator,
};
use audio_relay_loopback::{InProcessPort, MemoryMediaBuffer, MemoryOutput, SourceDirectory, ToneSourceAcquirer};

struct LogDelegate;

impl RelayDelegate for LogDelegate {
    fn on_status_changed(&self, status: CaptureStatus, indicator: StatusIndicator) {
        log::info!("status: {:?} (indicator {})", status, indicator.color());
    }

    fn on_title_changed(&self, source: &SourceHandle) {
        log::info!("now capturing {:?}", source.title);
    }

    fn on_error(&self, error: &RelayError) {
        log::error!("relay error: {}", error);
    }
}

struct ConsumerReport {
    id: ConsumerId,
    stats: ConsumerStats,
    buffered_bytes: usize,
    level: f32,
}

fn spawn_consumer(
    id: &str,
    relay: RelayHandle,
    prefix: String,
    lifetime: Duration,
) -> Result<thread::JoinHandle<Result<ConsumerReport, RelayError>>, RelayError> {
    let id = ConsumerId::new(id);
    thread::Builder::new()
        .name(format!("consumer-{}", id))
        .spawn(move || {
            let mut endpoint = ConsumerEndpoint::new(
                id.clone(),
                &prefix,
                PlaybackReassembler::new(MemoryMediaBuffer::new(), MemoryOutput::new(), 50),
            );
            let (port, rx) = InProcessPort::open(endpoint.channel_name());
            relay.send(RelayEvent::ConsumerConnected(port))?;
            relay.send(RelayEvent::ConsumerMessage(id.clone(), endpoint.request_audio()))?;

            let deadline = Instant::now() + lifetime;
            while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
                match rx.recv_timeout(remaining.min(Duration::from_millis(50))) {
                    Ok(message) => endpoint.on_message(message)?,
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                // The buffer finishes its update between messages
                if endpoint.reassembler_mut().buffer_mut().finish_update() {
                    endpoint.on_buffer_ready()?;
                }
            }

            if relay.send(RelayEvent::ConsumerDisconnected(id.clone())).is_err() {
                log::debug!("Relay already gone");
            }
            let buffer = endpoint.reassembler().buffer();
            let report = ConsumerReport {
                id: id.clone(),
                stats: endpoint.stats(),
                buffered_bytes: buffer.len(),
                level: pcm::rms_level(&buffer.decoded_samples()),
            };
            endpoint.close();
            Ok(report)
        })
        .map_err(|e| RelayError::InvalidState(format!("failed to spawn consumer: {}", e)))
}

/// Drive the relay's event loop for `duration`.
fn run_for(relay: &mut AudioRelay, duration: Duration) {
    let deadline = Instant::now() + duration;
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        relay.process_next(remaining.min(Duration::from_millis(20)));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let started = Utc::now();

    let directory = SourceDirectory::new();
    directory.open("1", "Lo-fi Radio", 440.0);
    directory.open("2", "Podcast", 330.0);

    let config = RelayConfiguration::default();
    let acquirer = ToneSourceAcquirer::new(directory.clone()).with_format(44100.0, 1);
    let mut relay = AudioRelay::with_pcm_codec(Box::new(acquirer), config.clone())?;
    relay.set_delegate(Arc::new(LogDelegate));
    relay.set_inspector(Arc::new(directory.clone()));
    relay.set_selection_store(SelectionStore::new(
        std::env::temp_dir().join("audio-relay-demo").join("selection.json"),
    ));
    directory.watch(relay.handle());

    let prefix = config.consumer_channel_prefix.clone();
    let consumers = vec![
        spawn_consumer("a", relay.handle(), prefix.clone(), Duration::from_millis(3500))?,
        spawn_consumer("b", relay.handle(), prefix, Duration::from_millis(1500))?,
    ];

    // Consumers connect before anything is selected and get audioNotReady
    run_for(&mut relay, Duration::from_millis(200));
    relay.dispatch(RelayEvent::SelectionChanged(ControlSelection::new("1", "bars")));
    run_for(&mut relay, Duration::from_millis(600));

    directory.rename("1", "Lo-fi Radio - Track 2");
    run_for(&mut relay, Duration::from_millis(1200));

    relay.dispatch(RelayEvent::SelectionChanged(ControlSelection::new("2", "waveform")));
    run_for(&mut relay, Duration::from_millis(800));

    directory.navigate("2", "Podcast - Episode 2");
    run_for(&mut relay, Duration::from_millis(900));

    for consumer in consumers {
        match consumer.join() {
            Ok(Ok(report)) => println!(
                "consumer {}: {} chunks, {} bytes buffered, {} not-ready replies, {} stream resets, level {:.3}",
                report.id,
                report.stats.chunks_received,
                report.buffered_bytes,
                report.stats.not_ready_replies,
                report.stats.stream_resets,
                report.level
            ),
            Ok(Err(e)) => println!("consumer failed: {}", e),
            Err(_) => println!("consumer thread panicked"),
        }
    }

    relay.process_pending();
    relay.dispatch(RelayEvent::Stop);
    let d = relay.diagnostics();
    println!(
        "relay: {} acquisitions, {} teardowns, {} idle reclamations, ran {}ms",
        d.acquisitions,
        d.teardowns,
        d.idle_reclamations,
        (Utc::now() - started).num_milliseconds()
    );
    Ok(())
}
