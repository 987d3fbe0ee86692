//! Streaming player worker.
//!
//! A single worker thread owns the [`Scheduler`] and the output engine. Producer calls and
//! engine completions reach it as messages, so every counter/flag update is serialized without
//! locks. No handle method waits for audio to play.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use voice_types::StreamStatus;

use crate::accumulator::SampleHistory;
use crate::config::PlayerConfig;
use crate::convert::{ChunkPayload, FormatConverter};
use crate::engine::{Completion, CpalEngine, OutputEngine};
use crate::error::ConfigurationError;
use crate::events::{EventEmitter, PlaybackEvent};
use crate::scheduler::{EnqueueOutcome, Scheduler};
use crate::session;

/// Commands accepted by the player worker.
enum PlayerCommand {
    Chunk(ChunkPayload),
    StreamComplete,
    Interrupt,
    Reset,
    Status(Sender<StreamStatus>),
    Shutdown,
}

/// Handle to a running streaming player.
///
/// Dropping the handle shuts the worker down and releases the output device.
pub struct StreamPlayer {
    cmd_tx: Sender<PlayerCommand>,
    events: Arc<EventEmitter>,
    interrupted: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl StreamPlayer {
    /// Start a player on the configured CPAL output device.
    pub fn open(config: PlayerConfig) -> Result<Self, ConfigurationError> {
        Self::with_engine(config, |cfg| CpalEngine::open(cfg))
    }

    /// Start a player whose engine is built by `factory` on the worker thread.
    ///
    /// The session policy is applied before `factory` runs. Returns once the engine exists, so
    /// device errors surface here rather than on the first chunk.
    pub fn with_engine<E, F>(config: PlayerConfig, factory: F) -> Result<Self, ConfigurationError>
    where
        E: OutputEngine + 'static,
        F: FnOnce(&PlayerConfig) -> Result<E, ConfigurationError> + Send + 'static,
    {
        config.validate()?;
        let converter = FormatConverter::new(config.sample_rate_hz, FormatConverter::CHANNELS)
            .map_err(|e| ConfigurationError::Invalid(e.to_string()))?;

        let events = Arc::new(EventEmitter::new());
        let interrupted = Arc::new(AtomicBool::new(false));
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let worker_events = events.clone();
        let worker_interrupted = interrupted.clone();
        let join = std::thread::Builder::new()
            .name("voice-player".to_string())
            .spawn(move || {
                let policy = session::policy_for(&config);
                session::apply_session(policy.as_ref());
                let engine = match factory(&config) {
                    Ok(engine) => engine,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let (done_tx, done_rx) = crossbeam_channel::unbounded();
                let scheduler = Scheduler::new(
                    engine,
                    converter,
                    policy,
                    SampleHistory::new(config.sample_rate_hz, config.history_channels()),
                    worker_events,
                    done_tx,
                    worker_interrupted,
                );
                let _ = ready_tx.send(Ok(()));
                player_thread_main(scheduler, cmd_rx, done_rx);
            })
            .map_err(|e| ConfigurationError::Worker(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                cmd_tx,
                events,
                interrupted,
                join: Some(join),
            }),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(ConfigurationError::Worker(
                    "player worker exited during setup".to_string(),
                ))
            }
        }
    }

    /// Subscribe to playback events emitted from now on.
    pub fn subscribe(&self) -> Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Queue one chunk (base64 text or raw PCM16 bytes) for playback.
    pub fn submit_chunk(&self, chunk: impl Into<ChunkPayload>) {
        self.send(PlayerCommand::Chunk(chunk.into()));
    }

    /// Queue one base64-encoded PCM16 chunk.
    pub fn submit_base64(&self, text: &str) {
        self.submit_chunk(text);
    }

    /// Declare that no further chunks will arrive for this stream.
    pub fn declare_stream_complete(&self) {
        self.send(PlayerCommand::StreamComplete);
    }

    /// Stop playback now. Chunks not yet enqueued, including ones already sent, are rejected
    /// until [`StreamPlayer::reset`].
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.send(PlayerCommand::Interrupt);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Start a fresh stream: clears latches, counters and history.
    pub fn reset(&self) {
        self.send(PlayerCommand::Reset);
    }

    /// Queue snapshot taken on the worker, or `None` once the worker is gone.
    pub fn status(&self) -> Option<StreamStatus> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.cmd_tx.send(PlayerCommand::Status(reply_tx)).ok()?;
        reply_rx.recv().ok()
    }

    /// Stop the engine and join the worker. Safe to call more than once.
    pub fn shutdown(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        let _ = self.cmd_tx.send(PlayerCommand::Shutdown);
        if join.join().is_err() {
            tracing::warn!("player worker panicked");
        }
    }

    fn send(&self, cmd: PlayerCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::warn!("player worker is gone; command dropped");
        }
    }
}

impl Drop for StreamPlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Main loop for the player worker.
fn player_thread_main<E: OutputEngine>(
    mut scheduler: Scheduler<E>,
    cmd_rx: Receiver<PlayerCommand>,
    done_rx: Receiver<Completion>,
) {
    tracing::info!("player worker started");
    let mut running = true;
    while running {
        crossbeam_channel::select! {
            recv(cmd_rx) -> msg => match msg {
                Ok(PlayerCommand::Shutdown) | Err(_) => running = false,
                Ok(cmd) => handle_command(&mut scheduler, cmd),
            },
            recv(done_rx) -> msg => {
                if let Ok(done) = msg {
                    scheduler.on_completion(done);
                }
            }
        }
    }
    scheduler.shutdown();
    tracing::info!("player worker stopped");
}

fn handle_command<E: OutputEngine>(scheduler: &mut Scheduler<E>, cmd: PlayerCommand) {
    match cmd {
        PlayerCommand::Chunk(payload) => match scheduler.submit_chunk(payload) {
            Ok(EnqueueOutcome::Queued { .. }) | Ok(EnqueueOutcome::Skipped) => {}
            Ok(outcome) => tracing::debug!(?outcome, "chunk not played"),
            Err(e) => tracing::warn!("dropping chunk: {e:#}"),
        },
        PlayerCommand::StreamComplete => scheduler.declare_stream_complete(),
        PlayerCommand::Interrupt => scheduler.interrupt(),
        PlayerCommand::Reset => scheduler.reset(),
        PlayerCommand::Status(reply) => {
            let _ = reply.send(scheduler.status());
        }
        PlayerCommand::Shutdown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::convert::{PlayableBuffer, encode_base64, pcm16_to_bytes};
    use crate::engine::EngineState;
    use crate::error::EngineStartError;

    const WAIT: Duration = Duration::from_secs(2);

    /// Engine double that either completes every buffer on submission or holds it forever.
    struct TestEngine {
        auto_complete: bool,
        completions: Option<Sender<Completion>>,
    }

    impl TestEngine {
        fn completing() -> Self {
            Self {
                auto_complete: true,
                completions: None,
            }
        }

        fn holding() -> Self {
            Self {
                auto_complete: false,
                completions: None,
            }
        }
    }

    impl OutputEngine for TestEngine {
        fn state(&self) -> EngineState {
            if self.completions.is_some() {
                EngineState::Running
            } else {
                EngineState::Idle
            }
        }

        fn start(&mut self, completions: &Sender<Completion>) -> Result<(), EngineStartError> {
            self.completions = Some(completions.clone());
            Ok(())
        }

        fn submit(&mut self, token: Completion, _buffer: PlayableBuffer) {
            if self.auto_complete {
                if let Some(tx) = self.completions.as_ref() {
                    let _ = tx.send(token);
                }
            }
        }

        fn stop(&mut self) {
            self.completions = None;
        }
    }

    fn chunk_b64(samples: usize) -> String {
        encode_base64(&pcm16_to_bytes(&vec![500i16; samples]))
    }

    fn collect_until_finished(rx: &Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.recv_timeout(WAIT) {
            let done = event == PlaybackEvent::PlaybackFinished;
            out.push(event);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn streams_chunks_to_finished() {
        let player =
            StreamPlayer::with_engine(PlayerConfig::default(), |_| Ok(TestEngine::completing()))
                .unwrap();
        let events = player.subscribe();
        for _ in 0..3 {
            player.submit_base64(&chunk_b64(100));
        }
        player.declare_stream_complete();

        let got = collect_until_finished(&events);
        assert_eq!(got.last(), Some(&PlaybackEvent::PlaybackFinished));
        let collected: Vec<_> = got
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::StreamCollected(snapshot) => Some(snapshot.samples.len()),
                _ => None,
            })
            .collect();
        assert_eq!(collected, vec![300]);
        let depths = got
            .iter()
            .filter(|e| matches!(e, PlaybackEvent::ChunkQueued { .. }))
            .count();
        assert_eq!(depths, 3);

        let status = player.status().unwrap();
        assert_eq!((status.scheduled, status.completed), (3, 3));
        assert!(status.finished);
    }

    #[test]
    fn invalid_config_fails_synchronously() {
        let cfg = PlayerConfig {
            sample_rate_hz: 0,
            ..PlayerConfig::default()
        };
        let err = StreamPlayer::with_engine(cfg, |_| Ok(TestEngine::holding()))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigurationError::Invalid(_)));
    }

    #[test]
    fn engine_factory_error_is_returned() {
        let err = StreamPlayer::with_engine(PlayerConfig::default(), |_| {
            Err::<TestEngine, _>(ConfigurationError::Device(anyhow::anyhow!(
                "No default output device"
            )))
        })
        .err()
        .unwrap();
        assert!(matches!(err, ConfigurationError::Device(_)));
    }

    #[test]
    fn interrupt_rejects_until_reset() {
        let player =
            StreamPlayer::with_engine(PlayerConfig::default(), |_| Ok(TestEngine::holding()))
                .unwrap();
        player.submit_chunk(pcm16_to_bytes(&[1, 2, 3]));
        assert_eq!(player.status().unwrap().scheduled, 1);
        player.interrupt();
        assert!(player.is_interrupted());
        player.submit_chunk(pcm16_to_bytes(&[4, 5, 6]));

        let status = player.status().unwrap();
        assert_eq!(status.scheduled, 1);
        assert!(status.interrupted);
        assert!(!status.engine_running);

        player.reset();
        player.submit_chunk(pcm16_to_bytes(&[7, 8]));
        let status = player.status().unwrap();
        assert_eq!(status.generation, 1);
        assert_eq!(status.scheduled, 1);
        assert!(!status.interrupted);
        assert!(status.engine_running);
    }

    #[test]
    fn malformed_chunks_do_not_stop_the_stream() {
        let player =
            StreamPlayer::with_engine(PlayerConfig::default(), |_| Ok(TestEngine::holding()))
                .unwrap();
        player.submit_chunk(vec![1u8, 2, 3]);
        player.submit_base64("%%%");
        player.submit_chunk(pcm16_to_bytes(&[1]));
        assert_eq!(player.status().unwrap().scheduled, 1);
    }

    #[test]
    fn stereo_history_is_collected() {
        let cfg = PlayerConfig {
            stereo_history: true,
            ..PlayerConfig::default()
        };
        let player = StreamPlayer::with_engine(cfg, |_| Ok(TestEngine::completing())).unwrap();
        let events = player.subscribe();
        player.submit_chunk(pcm16_to_bytes(&[1, 2]));
        player.declare_stream_complete();

        let snapshot = collect_until_finished(&events)
            .into_iter()
            .find_map(|e| match e {
                PlaybackEvent::StreamCollected(snapshot) => Some(snapshot),
                _ => None,
            })
            .unwrap();
        assert_eq!(snapshot.channels, 2);
        assert_eq!(snapshot.samples.len(), 4);
    }

    #[test]
    fn shutdown_stops_worker() {
        let mut player =
            StreamPlayer::with_engine(PlayerConfig::default(), |_| Ok(TestEngine::holding()))
                .unwrap();
        player.shutdown();
        assert!(player.status().is_none());
        player.shutdown();
    }
}
