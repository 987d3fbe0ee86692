//! CPAL-backed output engine.
//!
//! The output stream is built lazily on [`OutputEngine::start`] and dropped on
//! [`OutputEngine::stop`]. The real-time callback:
//! - pulls samples from the player node through the rate stage without blocking on channels
//! - maps the mono stream onto every device channel
//! - converts `f32` samples to the device sample format
//! - sends a [`Completion`] for every buffer it finishes

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::Sender;

use super::rate::{QueuedBuffer, RateStage};
use super::{Completion, EngineState, OutputEngine};
use crate::config::PlayerConfig;
use crate::convert::PlayableBuffer;
use crate::device;
use crate::error::{ConfigurationError, EngineStartError};

/// State shared between the engine and its output callback.
struct PlayerNode {
    queue: VecDeque<QueuedBuffer>,
    stage: RateStage,
    completions: Option<Sender<Completion>>,
}

/// Output engine playing through a CPAL device.
pub struct CpalEngine {
    device: cpal::Device,
    sample_format: cpal::SampleFormat,
    stream_config: cpal::StreamConfig,
    node: Arc<Mutex<PlayerNode>>,
    underrun_frames: Arc<AtomicU64>,
    stream: Option<cpal::Stream>,
}

impl CpalEngine {
    /// Open the configured output device and pick a stream config for the player rate.
    ///
    /// The stream itself is not built until the first [`OutputEngine::start`].
    pub fn open(config: &PlayerConfig) -> Result<Self, ConfigurationError> {
        Self::open_inner(config).map_err(ConfigurationError::Device)
    }

    fn open_inner(config: &PlayerConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, config.device_needle())?;
        let supported = device::pick_output_config(&device, config.sample_rate_hz)?;
        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        if let Some(buf) = device::pick_buffer_size(&supported, config.buffer_size_frames) {
            stream_config.buffer_size = buf;
        }

        let stage = RateStage::new(
            config.sample_rate_hz,
            stream_config.sample_rate,
            config.effective_playback_rate(),
        );
        tracing::info!(
            device = %device.description().map(|d| d.to_string()).unwrap_or_default(),
            output_rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            sample_format = ?supported.sample_format(),
            rate_step = stage.step(),
            "output engine opened"
        );

        Ok(Self {
            device,
            sample_format: supported.sample_format(),
            stream_config,
            node: Arc::new(Mutex::new(PlayerNode {
                queue: VecDeque::new(),
                stage,
                completions: None,
            })),
            underrun_frames: Arc::new(AtomicU64::new(0)),
            stream: None,
        })
    }

    /// Frames of silence emitted because nothing was queued.
    pub fn underrun_frames(&self) -> u64 {
        self.underrun_frames.load(Ordering::Relaxed)
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        match self.sample_format {
            cpal::SampleFormat::F32 => self.build_stream_typed::<f32>(),
            cpal::SampleFormat::I16 => self.build_stream_typed::<i16>(),
            cpal::SampleFormat::I32 => self.build_stream_typed::<i32>(),
            cpal::SampleFormat::U16 => self.build_stream_typed::<u16>(),
            other => Err(anyhow!("Unsupported sample format: {other:?}")),
        }
    }

    fn build_stream_typed<T>(&self) -> Result<cpal::Stream>
    where
        T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
    {
        let channels_out = (self.stream_config.channels as usize).max(1);
        let node = self.node.clone();
        let underruns = self.underrun_frames.clone();

        let err_fn = |err| tracing::warn!("stream error: {err}");

        let stream = self.device.build_output_stream(
            &self.stream_config,
            move |data: &mut [T], _| {
                let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
                let Ok(mut guard) = node.lock() else {
                    data.fill(silence);
                    return;
                };
                let PlayerNode {
                    queue,
                    stage,
                    completions,
                } = &mut *guard;

                let frames = data.len() / channels_out;
                for frame in 0..frames {
                    let next = stage.next_sample(queue, |token| {
                        if let Some(tx) = completions.as_ref() {
                            let _ = tx.send(token);
                        }
                    });
                    let Some(sample) = next else {
                        let remaining = frames - frame;
                        underruns.fetch_add(remaining as u64, Ordering::Relaxed);
                        data[frame * channels_out..].fill(silence);
                        break;
                    };
                    let out = <T as cpal::Sample>::from_sample::<f32>(sample);
                    data[frame * channels_out..(frame + 1) * channels_out].fill(out);
                }
            },
            err_fn,
            None,
        )?;
        Ok(stream)
    }
}

impl OutputEngine for CpalEngine {
    fn state(&self) -> EngineState {
        if self.stream.is_some() {
            EngineState::Running
        } else {
            EngineState::Idle
        }
    }

    fn start(&mut self, completions: &Sender<Completion>) -> Result<(), EngineStartError> {
        if self.stream.is_some() {
            return Ok(());
        }
        if let Ok(mut node) = self.node.lock() {
            node.completions = Some(completions.clone());
            node.stage.reset();
        }
        let stream = self.build_stream().map_err(EngineStartError::Backend)?;
        stream
            .play()
            .map_err(|e| EngineStartError::Backend(e.into()))?;
        self.stream = Some(stream);
        tracing::info!("output engine started");
        Ok(())
    }

    fn submit(&mut self, token: Completion, buffer: PlayableBuffer) {
        if let Ok(mut node) = self.node.lock() {
            node.queue.push_back(QueuedBuffer {
                token,
                samples: buffer.into_samples(),
            });
        }
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
            tracing::info!("output engine stopped");
        }
        if let Ok(mut node) = self.node.lock() {
            let dropped = node.queue.len();
            node.queue.clear();
            node.stage.reset();
            node.completions = None;
            if dropped > 0 {
                tracing::debug!(dropped, "discarded unplayed buffers");
            }
        }
    }
}

impl Drop for CpalEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
