use serde::Deserialize;

use crate::error::ConfigurationError;

/// Sample rate of realtime voice PCM16 streams.
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 24_000;

/// Attenuation applied on output-constrained platforms.
pub const DEFAULT_CONSTRAINED_GAIN: f32 = 0.5;

const MIN_PLAYBACK_RATE: f32 = 0.25;
const MAX_PLAYBACK_RATE: f32 = 4.0;

/// Output routing profile, selecting the session/gain policy.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputProfile {
    /// Pick by target platform.
    #[default]
    Auto,
    /// Desktop-style output; no gain correction.
    Standard,
    /// Platform applies its own auto-gain to voice output; attenuate after conversion.
    Constrained,
}

impl OutputProfile {
    /// Resolve `Auto` to a concrete profile for the compile target.
    pub fn resolve(self) -> OutputProfile {
        match self {
            OutputProfile::Auto => {
                if cfg!(any(target_os = "ios", target_os = "android")) {
                    OutputProfile::Constrained
                } else {
                    OutputProfile::Standard
                }
            }
            other => other,
        }
    }
}

/// Streaming player settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Sample rate of incoming PCM16 chunks (and of the playable buffers).
    pub sample_rate_hz: u32,
    /// Output device substring match; `None` uses the host default.
    pub device: Option<String>,
    /// Duplicate each mono sample into interleaved stereo in the collected history.
    pub stereo_history: bool,
    /// Playback speed multiplier applied by the rate stage.
    pub playback_rate: f32,
    /// Output routing profile.
    pub output_profile: OutputProfile,
    /// Gain multiplier used by the constrained profile.
    pub constrained_gain: f32,
    /// Fixed output callback buffer size in frames, if the device allows it.
    pub buffer_size_frames: Option<u32>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            device: None,
            stereo_history: false,
            playback_rate: 1.0,
            output_profile: OutputProfile::Auto,
            constrained_gain: DEFAULT_CONSTRAINED_GAIN,
            buffer_size_frames: None,
        }
    }
}

impl PlayerConfig {
    /// Reject values no engine can honor.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.sample_rate_hz == 0 {
            return Err(ConfigurationError::Invalid(
                "sample_rate_hz must be greater than zero".to_string(),
            ));
        }
        if !self.playback_rate.is_finite() || self.playback_rate <= 0.0 {
            return Err(ConfigurationError::Invalid(format!(
                "playback_rate must be a positive number, got {}",
                self.playback_rate
            )));
        }
        if !self.constrained_gain.is_finite() || self.constrained_gain <= 0.0 {
            return Err(ConfigurationError::Invalid(format!(
                "constrained_gain must be a positive number, got {}",
                self.constrained_gain
            )));
        }
        if self.buffer_size_frames == Some(0) {
            return Err(ConfigurationError::Invalid(
                "buffer_size_frames must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Playback rate clamped to the range the rate stage supports.
    pub fn effective_playback_rate(&self) -> f32 {
        self.playback_rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
    }

    /// Channel count of the collected history.
    pub fn history_channels(&self) -> u16 {
        if self.stereo_history { 2 } else { 1 }
    }

    /// Trimmed device needle, `None` when blank.
    pub fn device_needle(&self) -> Option<&str> {
        self.device
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}
