//! Offline mono resample to the player rate.
//!
//! Uses Rubato's sinc resampler over fixed-size input chunks, with the final short chunk
//! processed as a partial block. Zero-length blocks then flush the delay line, and the
//! resampler's output delay is trimmed so the result lines up with the input.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

/// Input block size in frames.
const CHUNK_FRAMES: usize = 1024;

/// Upper bound on tail flushes; one normally covers the sinc delay.
const MAX_FLUSHES: usize = 4;

/// Resample mono `samples` from `src_rate` to `dst_rate`. Equal rates pass through.
pub fn resample_mono(samples: &[f32], src_rate: u32, dst_rate: u32) -> Result<Vec<f32>> {
    if src_rate == 0 || dst_rate == 0 {
        return Err(anyhow!("invalid resample rates: {src_rate} -> {dst_rate}"));
    }
    if src_rate == dst_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let f_ratio = dst_rate as f64 / src_rate as f64;

    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };

    let mut resampler = Async::<f32>::new_sinc(
        f_ratio,
        1.1,
        &params,
        CHUNK_FRAMES,
        1,
        FixedAsync::Input,
    )
    .map_err(|e| anyhow!("resampler init error: {e}"))?;

    let out_capacity = (CHUNK_FRAMES as f64 * f_ratio * 1.1).ceil() as usize + 16;
    let mut out_block = vec![0.0f32; out_capacity];
    let mut output = Vec::with_capacity((samples.len() as f64 * f_ratio) as usize + out_capacity);

    let mut indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: None,
    };

    for block in samples.chunks(CHUNK_FRAMES) {
        let frames = block.len();
        let input_adapter = InterleavedSlice::new(block, 1, frames)
            .map_err(|e| anyhow!("interleaved slice (input) error: {e}"))?;
        let mut output_adapter = InterleavedSlice::new_mut(&mut out_block, 1, out_capacity)
            .map_err(|e| anyhow!("interleaved slice (output) error: {e}"))?;

        indexing.input_offset = 0;
        indexing.output_offset = 0;
        indexing.partial_len = (frames < CHUNK_FRAMES).then_some(frames);

        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| anyhow!("resampler process error: {e}"))?;
        output.extend_from_slice(&out_block[..nbr_out]);
    }

    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * f_ratio).round() as usize;
    let empty: [f32; 0] = [];
    for _ in 0..MAX_FLUSHES {
        if output.len() >= delay + expected {
            break;
        }
        let input_adapter = InterleavedSlice::new(&empty[..], 1, 0)
            .map_err(|e| anyhow!("interleaved slice (flush) error: {e}"))?;
        let mut output_adapter = InterleavedSlice::new_mut(&mut out_block, 1, out_capacity)
            .map_err(|e| anyhow!("interleaved slice (output) error: {e}"))?;
        indexing.input_offset = 0;
        indexing.output_offset = 0;
        indexing.partial_len = Some(0);
        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| anyhow!("resampler flush error: {e}"))?;
        output.extend_from_slice(&out_block[..nbr_out]);
    }
    output.drain(..delay.min(output.len()));
    output.truncate(expected);

    tracing::debug!(
        src_rate,
        dst_rate,
        in_frames = samples.len(),
        out_frames = output.len(),
        "resampled"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_rates_pass_through() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_mono(&input, 24_000, 24_000).unwrap(), input);
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(resample_mono(&[0.0], 0, 24_000).is_err());
    }

    #[test]
    fn downsample_keeps_exact_duration() {
        let input: Vec<f32> = (0..4_800).map(|i| ((i as f32) * 0.01).sin() * 0.5).collect();
        let out = resample_mono(&input, 48_000, 24_000).unwrap();
        assert_eq!(out.len(), 2_400);
        assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
    }

    #[test]
    fn tail_survives_resampling() {
        // Silence, then a constant level over the last 10 ms.
        let mut input = vec![0.0f32; 4_320];
        input.extend(std::iter::repeat_n(0.5f32, 480));
        let out = resample_mono(&input, 48_000, 24_000).unwrap();
        assert_eq!(out.len(), 2_400);
        let tail = &out[2_300..2_350];
        assert!(
            tail.iter().all(|s| (s - 0.5).abs() < 0.05),
            "tail not preserved: {tail:?}"
        );
    }
}
