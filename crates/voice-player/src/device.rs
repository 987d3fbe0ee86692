//! Output device discovery and stream config selection.
//!
//! Thin wrappers around CPAL for:
//! - listing output devices
//! - picking the default device or one matched by substring
//! - choosing a stream config close to the voice stream rate

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Largest fixed callback buffer we will request.
const MAX_BUFFER_FRAMES: u32 = 4_096;

/// Pick the first output device whose name contains `needle` (case-insensitive), or the
/// host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .map(|desc| matches_device_name(&desc.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Pick an output config for a stream at `target_rate`.
///
/// Ranking, best first: range contains the target rate, fewer channels (mono or stereo is
/// all a voice stream needs), friendlier sample format. The chosen rate is the target when
/// supported, otherwise the nearest range bound.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query output configs")?
        .collect();

    let best = ranges
        .into_iter()
        .map(|range| {
            let rate = clamp_rate(range.min_sample_rate(), range.max_sample_rate(), target_rate);
            let key = ConfigRank {
                off_target: rate != target_rate,
                channel_rank: channel_rank(range.channels()),
                format_rank: sample_format_rank(range.sample_format()),
                distance: rate.abs_diff(target_rate),
            };
            (key, range.with_sample_rate(rate))
        })
        .min_by_key(|(key, _)| *key);

    match best {
        Some((_, cfg)) => Ok(cfg),
        None => device
            .default_output_config()
            .context("No supported output configs"),
    }
}

/// Fixed buffer size for the stream, honoring `preferred_frames` within device limits.
///
/// Returns `None` (device default) when the device does not report a range and nothing was
/// requested.
pub fn pick_buffer_size(
    config: &cpal::SupportedStreamConfig,
    preferred_frames: Option<u32>,
) -> Option<cpal::BufferSize> {
    match (config.buffer_size(), preferred_frames) {
        (cpal::SupportedBufferSize::Range { min, max }, preferred) => {
            let wanted = preferred.unwrap_or(MAX_BUFFER_FRAMES.min(*max));
            Some(cpal::BufferSize::Fixed(wanted.clamp(*min, (*max).max(*min))))
        }
        (cpal::SupportedBufferSize::Unknown, Some(frames)) => Some(cpal::BufferSize::Fixed(frames)),
        (cpal::SupportedBufferSize::Unknown, None) => None,
    }
}

/// Print available output devices to stdout.
///
/// This is intended for CLI UX (`--list-devices`) rather than structured output.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let default_name = host
        .default_output_device()
        .and_then(|d| d.description().ok().map(|desc| desc.to_string()));
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        let name = d.description()?.to_string();
        let marker = if default_name.as_deref() == Some(name.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("#{i}: {name}{marker}");
    }
    Ok(())
}

/// Lower sorts first; field order is ranking priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ConfigRank {
    off_target: bool,
    channel_rank: u8,
    format_rank: u8,
    distance: u32,
}

fn clamp_rate(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn channel_rank(channels: u16) -> u8 {
    match channels {
        1 => 0,
        2 => 1,
        0 => u8::MAX,
        n => n.min(u8::MAX as u16 - 1) as u8,
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I16 => 1,
        cpal::SampleFormat::I32 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("MacBook Speakers", " speakers "));
        assert!(!matches_device_name("USB DAC", "headset"));
        assert!(!matches_device_name("USB DAC", "  "));
    }

    #[test]
    fn clamp_rate_prefers_target_inside_range() {
        assert_eq!(clamp_rate(8_000, 48_000, 24_000), 24_000);
        assert_eq!(clamp_rate(44_100, 96_000, 24_000), 44_100);
        assert_eq!(clamp_rate(8_000, 16_000, 24_000), 16_000);
    }

    #[test]
    fn channel_rank_prefers_mono_then_stereo() {
        assert!(channel_rank(1) < channel_rank(2));
        assert!(channel_rank(2) < channel_rank(6));
        assert_eq!(channel_rank(0), u8::MAX);
    }

    #[test]
    fn sample_format_rank_prefers_float() {
        assert!(sample_format_rank(cpal::SampleFormat::F32) < sample_format_rank(cpal::SampleFormat::I16));
        assert!(sample_format_rank(cpal::SampleFormat::U16) < sample_format_rank(cpal::SampleFormat::U8));
    }
}
