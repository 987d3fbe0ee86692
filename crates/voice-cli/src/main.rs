//! voice-play: plays a realtime-style PCM16 voice stream through the local output device.
//!
//! ## Modes
//! - `stream`: read base64 PCM16 chunks, one per line, from a file or stdin.
//! - `file`: decode an audio file, resample it to the player rate and feed it as chunks.
//!
//! In both modes the command waits for playback to finish (or be interrupted), optionally
//! exports everything received as WAV, and prints the end reason as JSON.

mod cli;
mod config;
mod decode;
mod resample;
mod runtime;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use voice_player::StreamPlayer;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,voice_play=info,voice_player=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let Some(cmd) = args.cmd.as_ref() else {
        bail!("no command given; use `stream`, `file <PATH>` or `--list-devices`");
    };

    let file_config = match args.config.as_deref() {
        Some(path) => config::load_file_config(path)?,
        None => config::FileConfig::default(),
    };
    let chunk_ms_flag = match cmd {
        cli::Command::File { chunk_ms, .. } => *chunk_ms,
        cli::Command::Stream { .. } => None,
    };
    let run = config::resolve(&args, file_config, chunk_ms_flag);

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("install Ctrl-C handler")?;
    }

    let (chunks, pace): (runtime::ChunkSource, Option<Duration>) = match cmd {
        cli::Command::Stream { input } => (runtime::line_chunks(input.as_deref())?, None),
        cli::Command::File { path, burst, .. } => {
            let chunks = runtime::file_chunks(path, run.player.sample_rate_hz, run.chunk_ms)?;
            let pace = (!burst).then(|| Duration::from_millis(run.chunk_ms));
            (Box::new(chunks.into_iter().map(Ok)), pace)
        }
    };

    let player = StreamPlayer::open(run.player.clone()).context("open player")?;
    let report = runtime::run_session(
        player,
        chunks,
        &runtime::SessionOptions {
            export: run.export.clone(),
            interrupt_after: run.interrupt_after_ms.map(Duration::from_millis),
            pace,
        },
        stop.clone(),
    )?;

    println!(
        "{}",
        serde_json::json!({
            "end_reason": report.end_reason,
            "status": report.status,
            "exported": report.exported,
        })
    );

    if stop.load(Ordering::SeqCst) {
        std::process::exit(130);
    }
    Ok(())
}
