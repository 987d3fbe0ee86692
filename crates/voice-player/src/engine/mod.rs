//! Output engine abstraction.
//!
//! An engine accepts playable buffers in submission order, plays them back to back, and
//! reports each finished buffer by sending its [`Completion`] token on the channel handed to
//! [`OutputEngine::start`]. Completions are the only way playback progress re-enters the
//! player.

mod output;
pub(crate) mod rate;

use crossbeam_channel::Sender;

use crate::convert::PlayableBuffer;
use crate::error::EngineStartError;

pub use output::CpalEngine;

/// Identifies one submitted buffer.
pub type BufferId = u64;

/// Token sent back by the engine once a buffer has fully played.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Completion {
    /// Stream generation the buffer belongs to.
    pub generation: u64,
    /// Per-generation submission index.
    pub id: BufferId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
}

/// Ordered buffer player driven by the scheduler.
///
/// Implementations need not be `Send`: the player builds its engine on the worker thread.
pub trait OutputEngine {
    fn state(&self) -> EngineState;

    /// Bring the output up. Completions for buffers submitted while running go to
    /// `completions`.
    fn start(&mut self, completions: &Sender<Completion>) -> Result<(), EngineStartError>;

    /// Queue `buffer` after everything submitted earlier. Only called while running.
    fn submit(&mut self, token: Completion, buffer: PlayableBuffer);

    /// Halt output now and discard unfinished buffers without reporting them.
    fn stop(&mut self);
}
