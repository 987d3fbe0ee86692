use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use voice_player::OutputProfile;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "voice-play", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// TOML config file; flags given here override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Sample rate of the incoming PCM16 chunks
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Playback speed multiplier (clamped to 0.25..=4.0)
    #[arg(long)]
    pub playback_rate: Option<f32>,

    /// Output routing profile
    #[arg(long, value_enum)]
    pub output_profile: Option<ProfileArg>,

    /// Fixed output callback buffer size in frames
    #[arg(long)]
    pub buffer_frames: Option<u32>,

    /// Collect the stream history as interleaved stereo
    #[arg(long)]
    pub stereo_history: bool,

    /// Write everything received to this WAV file once the stream completes
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Interrupt playback after this many milliseconds
    #[arg(long)]
    pub interrupt_after_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play base64 PCM16 chunks, one per line, from a file or stdin
    Stream {
        /// Chunk file (stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Decode an audio file and play it as a simulated realtime chunk stream
    File {
        /// Path to audio file
        path: PathBuf,

        /// Chunk duration in milliseconds
        #[arg(long)]
        chunk_ms: Option<u64>,

        /// Submit every chunk at once instead of pacing them at real time
        #[arg(long)]
        burst: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProfileArg {
    Auto,
    Standard,
    Constrained,
}

impl From<ProfileArg> for OutputProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Auto => OutputProfile::Auto,
            ProfileArg::Standard => OutputProfile::Standard,
            ProfileArg::Constrained => OutputProfile::Constrained,
        }
    }
}
