//! Run configuration: optional TOML file with CLI flags layered on top.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use voice_player::PlayerConfig;

use crate::cli::Args;

pub const DEFAULT_CHUNK_MS: u64 = 100;

/// Contents of a `--config` file.
///
/// ```toml
/// [player]
/// device = "USB"
/// stereo_history = true
///
/// [session]
/// export = "reply.wav"
/// chunk_ms = 40
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub player: PlayerConfig,
    pub session: SessionFileConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SessionFileConfig {
    pub export: Option<PathBuf>,
    pub chunk_ms: Option<u64>,
    pub interrupt_after_ms: Option<u64>,
}

/// Effective settings for one playback run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub player: PlayerConfig,
    pub export: Option<PathBuf>,
    pub interrupt_after_ms: Option<u64>,
    pub chunk_ms: u64,
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("read config {path:?}"))?;
    parse_file_config(&text).with_context(|| format!("parse config {path:?}"))
}

pub fn parse_file_config(text: &str) -> Result<FileConfig> {
    Ok(toml::from_str(text)?)
}

/// Merge `file` with the flags in `args`; flags win.
pub fn resolve(args: &Args, file: FileConfig, chunk_ms_flag: Option<u64>) -> RunConfig {
    let mut player = file.player;
    if let Some(device) = args.device.clone() {
        player.device = Some(device);
    }
    if let Some(rate) = args.sample_rate {
        player.sample_rate_hz = rate;
    }
    if let Some(rate) = args.playback_rate {
        player.playback_rate = rate;
    }
    if let Some(profile) = args.output_profile {
        player.output_profile = profile.into();
    }
    if let Some(frames) = args.buffer_frames {
        player.buffer_size_frames = Some(frames);
    }
    if args.stereo_history {
        player.stereo_history = true;
    }

    RunConfig {
        player,
        export: args.export.clone().or(file.session.export),
        interrupt_after_ms: args.interrupt_after_ms.or(file.session.interrupt_after_ms),
        chunk_ms: chunk_ms_flag
            .or(file.session.chunk_ms)
            .unwrap_or(DEFAULT_CHUNK_MS)
            .max(1),
    }
}
