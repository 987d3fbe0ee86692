//! Buffer queue & scheduler.
//!
//! Owns every piece of mutable per-stream state (queue counters, completion/interruption
//! latches, sample history) and is driven from exactly one thread: the player worker. The
//! engine's completion messages are fed back through [`Scheduler::on_completion`] on that same
//! thread, so counter updates never race.
//!
//! ## Stream lifecycle
//! - `scheduled` counts buffers handed to the engine (a failed engine start still counts);
//!   `completed` counts buffers the engine reported finished. `completed <= scheduled`.
//! - `declare_stream_complete` latches once, emits `StreamCollected`, and emits
//!   `PlaybackFinished` if the queue is already drained. Otherwise the completion that drains
//!   the queue emits it.
//! - `interrupt` latches, stops the engine and silences all further events for the stream
//!   except `StreamCollected`. Later chunks are rejected until `reset`.
//! - `reset` starts a new stream generation; late completions from older generations are
//!   ignored.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use voice_types::StreamStatus;

use crate::accumulator::SampleHistory;
use crate::convert::{ChunkPayload, FormatConverter, PlayableBuffer};
use crate::engine::{BufferId, Completion, EngineState, OutputEngine};
use crate::error::ChunkError;
use crate::events::{EventEmitter, PlaybackEvent};
use crate::session::SessionPolicy;

/// Result of handing one chunk or buffer to the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Submitted to the engine; `depth` is the backlog including this buffer.
    Queued { id: BufferId, depth: u64 },
    /// Empty chunk; nothing to play.
    Skipped,
    /// The stream was interrupted; reset before sending more audio.
    RejectedInterrupted,
    /// End-of-stream was already declared for this stream.
    RejectedComplete,
    /// Counted as scheduled, but the engine could not start; the buffer is lost.
    EngineFailed { id: BufferId },
}

pub struct Scheduler<E: OutputEngine> {
    engine: E,
    converter: FormatConverter,
    policy: Box<dyn SessionPolicy>,
    history: SampleHistory,
    events: Arc<EventEmitter>,
    completions: Sender<Completion>,
    interrupted: Arc<AtomicBool>,
    generation: u64,
    next_id: BufferId,
    scheduled: u64,
    completed: u64,
    lost: u64,
    stream_complete: bool,
    finished: bool,
}

impl<E: OutputEngine> Scheduler<E> {
    /// `completions` is the sending half handed to the engine on every (re)start.
    /// `interrupted` may be shared with the producer so an interrupt takes effect before
    /// already-queued commands are processed.
    pub fn new(
        engine: E,
        converter: FormatConverter,
        policy: Box<dyn SessionPolicy>,
        history: SampleHistory,
        events: Arc<EventEmitter>,
        completions: Sender<Completion>,
        interrupted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            engine,
            converter,
            policy,
            history,
            events,
            completions,
            interrupted,
            generation: 0,
            next_id: 0,
            scheduled: 0,
            completed: 0,
            lost: 0,
            stream_complete: false,
            finished: false,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Decode, convert, record and enqueue one producer chunk.
    ///
    /// Decode and conversion failures drop the chunk and are returned for logging; the
    /// stream keeps going either way.
    pub fn submit_chunk(&mut self, payload: ChunkPayload) -> Result<EnqueueOutcome, ChunkError> {
        if self.is_interrupted() {
            return Ok(EnqueueOutcome::RejectedInterrupted);
        }
        let mut buffer = self.converter.convert_payload(payload)?;
        if buffer.is_empty() {
            return Ok(EnqueueOutcome::Skipped);
        }
        if let Some(rejected) = self.rejection() {
            return Ok(rejected);
        }
        self.history.record(&buffer);
        self.policy.post_convert(&mut buffer);
        Ok(self.enqueue(buffer))
    }

    /// Submit a converted buffer after every buffer submitted before it.
    pub fn enqueue(&mut self, buffer: PlayableBuffer) -> EnqueueOutcome {
        if buffer.is_empty() {
            return EnqueueOutcome::Skipped;
        }
        if let Some(rejected) = self.rejection() {
            return rejected;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.scheduled += 1;

        if self.engine.state() != EngineState::Running {
            if let Err(e) = self.engine.start(&self.completions) {
                tracing::error!(
                    generation = self.generation,
                    id,
                    "engine start failed; dropping buffer: {e:#}"
                );
                self.lost += 1;
                return EnqueueOutcome::EngineFailed { id };
            }
        }

        let frames = buffer.frames();
        self.engine.submit(
            Completion {
                generation: self.generation,
                id,
            },
            buffer,
        );
        let depth = self.backlog();
        tracing::debug!(id, frames, depth, "buffer submitted");
        EnqueueOutcome::Queued { id, depth }
    }

    fn rejection(&self) -> Option<EnqueueOutcome> {
        if self.is_interrupted() {
            tracing::debug!(generation = self.generation, "chunk rejected: stream interrupted");
            return Some(EnqueueOutcome::RejectedInterrupted);
        }
        if self.stream_complete {
            tracing::warn!(
                generation = self.generation,
                "chunk rejected: stream already declared complete"
            );
            return Some(EnqueueOutcome::RejectedComplete);
        }
        None
    }

    /// Apply one engine completion message.
    pub fn on_completion(&mut self, done: Completion) {
        if done.generation != self.generation {
            tracing::debug!(
                generation = done.generation,
                current = self.generation,
                "ignoring completion from a previous stream"
            );
            return;
        }
        if self.completed >= self.scheduled {
            tracing::warn!(id = done.id, "completion without a scheduled buffer");
            return;
        }
        self.completed += 1;
        if self.is_interrupted() {
            return;
        }
        let depth = self.backlog();
        tracing::debug!(id = done.id, depth, "chunk played");
        self.events.emit(PlaybackEvent::ChunkQueued { depth });
        self.maybe_finish();
    }

    /// Latch end-of-stream. Repeated calls are no-ops.
    pub fn declare_stream_complete(&mut self) {
        if self.stream_complete {
            tracing::debug!(generation = self.generation, "stream already complete");
            return;
        }
        self.stream_complete = true;
        let snapshot = self.history.snapshot();
        tracing::info!(
            generation = self.generation,
            samples = snapshot.samples.len(),
            backlog = self.backlog(),
            "stream complete"
        );
        self.events.emit(PlaybackEvent::StreamCollected(snapshot));
        self.maybe_finish();
    }

    fn maybe_finish(&mut self) {
        if self.finished || !self.stream_complete || self.is_interrupted() {
            return;
        }
        if self.completed == self.scheduled {
            self.finished = true;
            tracing::info!(generation = self.generation, "playback finished");
            self.events.emit(PlaybackEvent::PlaybackFinished);
        }
    }

    /// Stop output immediately and refuse further audio for this stream.
    pub fn interrupt(&mut self) {
        self.interrupted.store(true, Ordering::SeqCst);
        if self.engine.state() == EngineState::Running {
            self.engine.stop();
        }
        tracing::info!(
            generation = self.generation,
            scheduled = self.scheduled,
            completed = self.completed,
            "playback interrupted"
        );
    }

    /// Begin a new stream: clear latches, counters and history.
    pub fn reset(&mut self) {
        if self.engine.state() == EngineState::Running {
            self.engine.stop();
        }
        self.generation += 1;
        self.next_id = 0;
        self.scheduled = 0;
        self.completed = 0;
        self.lost = 0;
        self.stream_complete = false;
        self.finished = false;
        self.history.clear();
        self.interrupted.store(false, Ordering::SeqCst);
        tracing::info!(generation = self.generation, "stream reset");
    }

    /// Stop the engine for good (player disposal).
    pub fn shutdown(&mut self) {
        if self.engine.state() == EngineState::Running {
            self.engine.stop();
        }
    }

    pub fn backlog(&self) -> u64 {
        self.scheduled - self.completed
    }

    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            generation: self.generation,
            scheduled: self.scheduled,
            completed: self.completed,
            lost: self.lost,
            stream_complete: self.stream_complete,
            interrupted: self.is_interrupted(),
            finished: self.finished,
            engine_running: self.engine.state() == EngineState::Running,
            history_samples: self.history.len() as u64,
        }
    }
}
