//! Streaming voice playback.
//!
//! Plays an open-ended sequence of small PCM16 mono chunks (as delivered by realtime voice
//! APIs) back to back without gaps, supports barge-in interruption at any point, and hands
//! out everything it received as a single waveform once the stream is declared complete.
//!
//! ## Pipeline
//! 1. **Convert**: base64/PCM16 chunk → `f32` playable buffer at the same rate.
//! 2. **Record**: samples are appended to the stream history.
//! 3. **Schedule**: buffers are submitted in arrival order; the output engine starts lazily.
//! 4. **Play**: the CPAL callback drains buffers through a rate stage and reports each one as
//!    finished; the scheduler turns that into [`PlaybackEvent`]s.

pub mod accumulator;
pub mod config;
pub mod convert;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod player;
pub mod scheduler;
pub mod session;
pub mod wav;

pub use accumulator::HistorySnapshot;
pub use config::{OutputProfile, PlayerConfig};
pub use convert::ChunkPayload;
pub use error::{ChunkError, ConfigurationError, ConversionError, DecodeError, EngineStartError};
pub use events::PlaybackEvent;
pub use player::StreamPlayer;
pub use voice_types::StreamStatus;
