//! Canonical 44-byte-header PCM16 WAV export.
//!
//! Layout (all integers little-endian):
//! `RIFF` · size-8 · `WAVE` · `fmt ` · 16 · format 1 · channels · rate · byte rate ·
//! block align · 16 bits · `data` · payload size · interleaved samples.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use cpal::Sample;

/// Size of the RIFF + fmt + data headers written by [`encode_wav`].
pub const WAV_HEADER_LEN: usize = 44;

const BITS_PER_SAMPLE: u16 = 16;
const FORMAT_PCM: u16 = 1;

/// Parsed header of a canonical PCM WAV file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavHeader {
    pub channels: u16,
    pub sample_rate_hz: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_len: u32,
}

/// Payload size field for `sample_count` PCM16 samples.
///
/// Fails when the payload plus the 36 header bytes counted by the RIFF size does not fit
/// in 32 bits.
pub fn wav_data_len(sample_count: usize) -> Result<u32> {
    sample_count
        .checked_mul(2)
        .and_then(|bytes| u32::try_from(bytes).ok())
        .filter(|bytes| *bytes <= u32::MAX - 36)
        .ok_or_else(|| anyhow!("{sample_count} samples exceed the 4 GiB WAV size limit"))
}

/// Serialize interleaved PCM16 samples into a WAV byte image.
pub fn encode_wav(samples: &[i16], channels: u16, sample_rate_hz: u32) -> Result<Vec<u8>> {
    let block_align = channels.saturating_mul(BITS_PER_SAMPLE / 8);
    let byte_rate = sample_rate_hz.saturating_mul(block_align as u32);
    let data_len = wav_data_len(samples.len())?;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate_hz.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    Ok(out)
}

/// Encode and write a WAV file to `path`.
pub fn write_wav(path: &Path, samples: &[i16], channels: u16, sample_rate_hz: u32) -> Result<()> {
    let bytes = encode_wav(samples, channels, sample_rate_hz)?;
    std::fs::write(path, bytes).with_context(|| format!("write wav {:?}", path))?;
    Ok(())
}

/// Parse the canonical 44-byte header produced by [`encode_wav`].
pub fn parse_wav_header(bytes: &[u8]) -> Result<WavHeader> {
    if bytes.len() < WAV_HEADER_LEN {
        return Err(anyhow!("wav too short: {} bytes", bytes.len()));
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(anyhow!("missing RIFF/WAVE tags"));
    }
    if &bytes[12..16] != b"fmt " || read_u32(bytes, 16) != 16 {
        return Err(anyhow!("expected a 16-byte fmt chunk"));
    }
    if read_u16(bytes, 20) != FORMAT_PCM {
        return Err(anyhow!("not PCM (format {})", read_u16(bytes, 20)));
    }
    if &bytes[36..40] != b"data" {
        return Err(anyhow!("missing data chunk"));
    }
    let riff_len = read_u32(bytes, 4);
    let data_len = read_u32(bytes, 40);
    if riff_len != 36u32.wrapping_add(data_len) {
        return Err(anyhow!(
            "RIFF size {riff_len} does not match data size {data_len}"
        ));
    }
    Ok(WavHeader {
        channels: read_u16(bytes, 22),
        sample_rate_hz: read_u32(bytes, 24),
        byte_rate: read_u32(bytes, 28),
        block_align: read_u16(bytes, 32),
        bits_per_sample: read_u16(bytes, 34),
        data_len,
    })
}

/// Quantize float history samples to PCM16, clamping out-of-range values.
pub fn history_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| s.clamp(-1.0, 1.0).to_sample::<i16>())
        .collect()
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_wav_header_layout_is_exact() {
        let bytes = encode_wav(&[1, -1], 1, 24_000).unwrap();
        assert_eq!(bytes.len(), WAV_HEADER_LEN + 4);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(read_u32(&bytes, 4), 40);
        assert_eq!(&bytes[8..16], b"WAVEfmt ");
        assert_eq!(read_u32(&bytes, 16), 16);
        assert_eq!(read_u16(&bytes, 20), 1);
        assert_eq!(read_u32(&bytes, 28), 48_000);
        assert_eq!(read_u16(&bytes, 32), 2);
        assert_eq!(read_u16(&bytes, 34), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(read_u32(&bytes, 40), 4);
        assert_eq!(&bytes[44..], &[0x01, 0x00, 0xff, 0xff]);
    }

    #[test]
    fn parse_recovers_stereo_header_fields() {
        let samples = vec![0i16; 600];
        let bytes = encode_wav(&samples, 2, 24_000).unwrap();
        let header = parse_wav_header(&bytes).unwrap();
        assert_eq!(header.channels, 2);
        assert_eq!(header.sample_rate_hz, 24_000);
        assert_eq!(header.byte_rate, 96_000);
        assert_eq!(header.block_align, 4);
        assert_eq!(header.bits_per_sample, 16);
        assert_eq!(header.data_len, 1_200);
    }

    #[test]
    fn parse_rejects_truncated_and_foreign_data() {
        assert!(parse_wav_header(b"RIFF").is_err());
        let mut bytes = encode_wav(&[0, 0], 1, 8_000).unwrap();
        bytes[8..12].copy_from_slice(b"AVI ");
        assert!(parse_wav_header(&bytes).is_err());
    }

    #[test]
    fn data_len_rejects_payloads_past_riff_limit() {
        assert_eq!(wav_data_len(0).unwrap(), 0);
        let max = ((u32::MAX - 36) / 2) as usize;
        assert_eq!(wav_data_len(max).unwrap(), (max * 2) as u32);
        assert!(wav_data_len(max + 1).is_err());
        assert!(wav_data_len(u32::MAX as usize).is_err());
        assert!(wav_data_len(usize::MAX).is_err());
    }

    #[test]
    fn history_to_pcm16_clamps() {
        let out = history_to_pcm16(&[0.0, -1.0, 2.0, -3.0]);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 0);
        assert_eq!(out[2], i16::MAX);
        assert_eq!(out[3], out[1]);
        assert!(out[3] <= -32_767);
    }

    #[test]
    fn write_wav_creates_file() {
        let path = std::env::temp_dir().join(format!("voice-player-wav-{}.wav", std::process::id()));
        write_wav(&path, &[7, 8, 9], 1, 16_000).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(parse_wav_header(&bytes).unwrap().data_len, 6);
    }
}
