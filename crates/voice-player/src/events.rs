//! Playback lifecycle events and their fan-out.
//!
//! The scheduler is the only producer. Any number of subscribers may attach at any time; a
//! subscriber only sees events emitted after it subscribed (no replay).

use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender};

use crate::accumulator::HistorySnapshot;

/// Events surfaced to the consumer.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackEvent {
    /// A buffer finished playing; `depth` buffers are still submitted but unfinished.
    ChunkQueued { depth: u64 },
    /// The producer declared end-of-stream; carries every sample received.
    StreamCollected(HistorySnapshot),
    /// End-of-stream was declared and every submitted buffer has played.
    PlaybackFinished,
}

/// Single-producer, multi-subscriber event fan-out.
pub struct EventEmitter {
    subscribers: Mutex<Vec<Sender<PlaybackEvent>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> Receiver<PlaybackEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    /// Number of live subscribers (dropped receivers are pruned on the next emit).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|subs| subs.len()).unwrap_or(0)
    }

    /// Deliver `event` to every live subscriber.
    ///
    /// Delivery happens under the subscriber lock so each receiver observes emission order.
    pub fn emit(&self, event: PlaybackEvent) {
        let Ok(mut subs) = self.subscribers.lock() else {
            return;
        };
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
