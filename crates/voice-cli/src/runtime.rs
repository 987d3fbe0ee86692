//! CLI runtime helpers.
//!
//! Provides device enumeration, chunk sources (line-delimited base64 or a decoded file) and
//! the session loop that feeds a [`StreamPlayer`] and waits for the stream to end.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use voice_player::convert::{encode_base64, pcm16_to_bytes};
use voice_player::{PlaybackEvent, StreamPlayer, device, wav};
use voice_types::{PlaybackEndReason, StreamStatus};

use crate::decode;
use crate::resample;

const EVENT_POLL: Duration = Duration::from_millis(50);

/// Ordered base64 chunks handed to the feeder thread.
pub type ChunkSource = Box<dyn Iterator<Item = Result<String>> + Send>;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// One chunk per non-blank line of `input` (stdin when `None`).
pub fn line_chunks(input: Option<&Path>) -> Result<ChunkSource> {
    let reader: Box<dyn BufRead + Send> = match input {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path).with_context(|| format!("open {path:?}"))?,
        )),
        None => Box::new(BufReader::new(std::io::stdin())),
    };
    Ok(Box::new(lines_to_chunks(reader)))
}

fn lines_to_chunks<R: BufRead>(reader: R) -> impl Iterator<Item = Result<String>> {
    reader.lines().filter_map(|line| match line {
        Ok(line) => {
            let trimmed = line.trim();
            (!trimmed.is_empty()).then(|| Ok(trimmed.to_string()))
        }
        Err(e) => Some(Err(anyhow::Error::new(e).context("read chunk line"))),
    })
}

/// Decode `path`, resample to `sample_rate_hz` mono and cut it into `chunk_ms` base64 chunks.
pub fn file_chunks(path: &Path, sample_rate_hz: u32, chunk_ms: u64) -> Result<Vec<String>> {
    let audio = decode::decode_file_mono(path)?;
    let samples = resample::resample_mono(&audio.samples, audio.sample_rate_hz, sample_rate_hz)?;
    let chunks = pcm16_chunks(&samples, sample_rate_hz, chunk_ms);
    tracing::info!(
        path = ?path,
        chunks = chunks.len(),
        chunk_ms,
        "file split into chunks"
    );
    Ok(chunks)
}

/// Quantize to PCM16 and split into base64 chunks of `chunk_ms` each (last may be shorter).
pub fn pcm16_chunks(samples: &[f32], sample_rate_hz: u32, chunk_ms: u64) -> Vec<String> {
    let frames = ((sample_rate_hz as u64 * chunk_ms) / 1000).max(1) as usize;
    wav::history_to_pcm16(samples)
        .chunks(frames)
        .map(|chunk| encode_base64(&pcm16_to_bytes(chunk)))
        .collect()
}

/// Options for one playback session.
#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    /// Write the collected history here when the stream completes.
    pub export: Option<PathBuf>,
    /// Interrupt this long after the session starts.
    pub interrupt_after: Option<Duration>,
    /// Sleep between chunk submissions to mimic a realtime producer.
    pub pace: Option<Duration>,
}

/// Result of a finished session.
#[derive(Clone, Debug)]
pub struct SessionReport {
    pub end_reason: PlaybackEndReason,
    pub status: Option<StreamStatus>,
    pub exported: Option<PathBuf>,
}

/// Feed `chunks` to `player` and wait until playback ends.
///
/// Ends with `Eof` on `PlaybackFinished`, `Stopped` once an interrupted stream has been
/// collected, and `Error` when the stream is complete and only buffers lost to a failed engine
/// start remain. Setting `stop` (Ctrl-C) interrupts the stream.
///
/// The feeder only holds a weak handle, so the player shuts down when this returns even if
/// the feeder is still blocked on its source.
pub fn run_session(
    player: StreamPlayer,
    chunks: ChunkSource,
    opts: &SessionOptions,
    stop: Arc<AtomicBool>,
) -> Result<SessionReport> {
    let player = Arc::new(player);
    let events = player.subscribe();

    let feeder = {
        let player = Arc::downgrade(&player);
        let pace = opts.pace;
        std::thread::Builder::new()
            .name("voice-feeder".to_string())
            .spawn(move || feed_chunks(&player, chunks, pace))
            .context("spawn feeder thread")?
    };

    let started = Instant::now();
    let mut interrupted = false;
    let mut collected = false;
    let mut exported = None;
    let end_reason = loop {
        if interrupted && collected {
            break PlaybackEndReason::Stopped;
        }
        if !interrupted {
            let timed_out = opts
                .interrupt_after
                .is_some_and(|after| started.elapsed() >= after);
            if stop.load(Ordering::SeqCst) || timed_out {
                tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "interrupting");
                player.interrupt();
                // The feeder may be blocked on its source; collect the partial stream now.
                player.declare_stream_complete();
                interrupted = true;
            }
        }

        match events.recv_timeout(EVENT_POLL) {
            Ok(PlaybackEvent::ChunkQueued { depth }) => {
                tracing::debug!(depth, "chunk played");
            }
            Ok(PlaybackEvent::StreamCollected(snapshot)) => {
                collected = true;
                if let Some(path) = opts.export.as_ref() {
                    match snapshot.write_wav(path) {
                        Ok(()) => {
                            tracing::info!(
                                path = ?path,
                                frames = snapshot.frames(),
                                duration_ms = snapshot.duration_ms(),
                                "history exported"
                            );
                            exported = Some(path.clone());
                        }
                        Err(e) => tracing::warn!("history export failed: {e:#}"),
                    }
                }
                if player.is_interrupted() {
                    interrupted = true;
                }
            }
            Ok(PlaybackEvent::PlaybackFinished) => break PlaybackEndReason::Eof,
            Err(RecvTimeoutError::Timeout) => {
                if let Some(status) = player.status() {
                    if engine_stalled(&status) {
                        tracing::error!(
                            backlog = status.backlog(),
                            lost = status.lost,
                            "stream cannot finish; buffers were lost to a failed engine start"
                        );
                        break PlaybackEndReason::Error;
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => break PlaybackEndReason::Error,
        }
    };

    let status = player.status();
    if end_reason != PlaybackEndReason::Eof && !interrupted {
        player.interrupt();
    }
    if end_reason == PlaybackEndReason::Eof {
        if feeder.join().is_err() {
            tracing::warn!("feeder thread panicked");
        }
    }
    tracing::info!(reason = ?end_reason, "playback ended");

    Ok(SessionReport {
        end_reason,
        status,
        exported,
    })
}

/// Submit every chunk in order, then declare the stream complete.
///
/// Stops early once the player is interrupted or gone. The player is only upgraded while a
/// chunk is in hand, never across a blocking read from the source.
fn feed_chunks(player: &Weak<StreamPlayer>, chunks: ChunkSource, pace: Option<Duration>) {
    let mut sent = 0u64;
    for chunk in chunks {
        let Some(live) = player.upgrade() else {
            tracing::debug!(sent, "player gone; feeder exiting");
            return;
        };
        if live.is_interrupted() {
            break;
        }
        match chunk {
            Ok(text) => {
                live.submit_base64(&text);
                sent += 1;
            }
            Err(e) => {
                tracing::warn!("chunk source failed: {e:#}");
                break;
            }
        }
        drop(live);
        if let Some(pace) = pace {
            std::thread::sleep(pace);
        }
    }
    tracing::debug!(sent, "chunk source drained");
    if let Some(live) = player.upgrade() {
        live.declare_stream_complete();
    }
}

fn engine_stalled(status: &StreamStatus) -> bool {
    status.stream_complete && !status.interrupted && status.drained_with_losses()
}
