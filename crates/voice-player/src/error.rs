//! Error taxonomy for the streaming player.
//!
//! Only [`ConfigurationError`] ever reaches a caller as a hard failure. Every per-chunk error
//! is logged and absorbed by the scheduler; a dropped chunk is an audible gap, not a crash.

use thiserror::Error;

/// Construction-time failure: the player cannot produce audio at all.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A config value is out of range.
    #[error("invalid player config: {0}")]
    Invalid(String),
    /// No usable output device or stream configuration.
    #[error("output device unavailable")]
    Device(#[source] anyhow::Error),
    /// The player worker thread could not be started or died during setup.
    #[error("player worker unavailable: {0}")]
    Worker(String),
}

/// A chunk could not be turned into a playable buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// Byte length is not a whole number of 16-bit samples.
    #[error("chunk of {len} bytes is not a whole number of 16-bit samples")]
    TruncatedSample { len: usize },
    /// The output buffer could not be allocated.
    #[error("cannot allocate a playable buffer of {frames} frames")]
    Allocation { frames: usize },
    /// The converter does not handle this input/output format pair.
    #[error("unsupported format pair: {channels} channel(s) at {rate_hz} Hz")]
    UnsupportedFormat { channels: u16, rate_hz: u32 },
}

/// Malformed chunk encoding, detected before conversion.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("chunk is not valid base64")]
    Base64(#[from] base64::DecodeError),
}

/// Output engine could not be (re)started for an enqueue.
#[derive(Debug, Error)]
pub enum EngineStartError {
    /// The audio backend refused to build or start the output stream.
    #[error("output stream failed to start")]
    Backend(#[source] anyhow::Error),
}

/// Any failure on the per-chunk path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}
