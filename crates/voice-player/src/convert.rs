//! Chunk decoding and format conversion.
//!
//! Turns one producer chunk (base64 text or raw bytes of 16-bit little-endian mono PCM) into a
//! [`PlayableBuffer`] of `f32` samples at the same sample rate. Nothing here resamples: the
//! conversion changes sample representation only.

use base64::{Engine as _, engine::general_purpose};
use cpal::Sample;

use crate::error::{ChunkError, ConversionError, DecodeError};

/// One arrival unit from the producer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkPayload {
    /// Base64 text as delivered by realtime voice APIs.
    Base64(String),
    /// Raw 16-bit little-endian PCM bytes.
    Pcm16(Vec<u8>),
}

impl From<Vec<u8>> for ChunkPayload {
    fn from(bytes: Vec<u8>) -> Self {
        ChunkPayload::Pcm16(bytes)
    }
}

impl From<&[u8]> for ChunkPayload {
    fn from(bytes: &[u8]) -> Self {
        ChunkPayload::Pcm16(bytes.to_vec())
    }
}

impl From<String> for ChunkPayload {
    fn from(text: String) -> Self {
        ChunkPayload::Base64(text)
    }
}

impl From<&str> for ChunkPayload {
    fn from(text: &str) -> Self {
        ChunkPayload::Base64(text.to_string())
    }
}

impl ChunkPayload {
    /// Decode to raw PCM bytes. Raw payloads pass through untouched.
    pub fn into_pcm_bytes(self) -> Result<Vec<u8>, DecodeError> {
        match self {
            ChunkPayload::Pcm16(bytes) => Ok(bytes),
            ChunkPayload::Base64(text) => decode_base64(&text),
        }
    }
}

/// Decode one base64 chunk, ignoring surrounding whitespace.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(general_purpose::STANDARD.decode(text.trim())?)
}

/// Encode raw PCM bytes as a base64 chunk.
pub fn encode_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Engine-ready mono `f32` samples derived 1:1 from a chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayableBuffer {
    sample_rate_hz: u32,
    samples: Vec<f32>,
}

impl PlayableBuffer {
    pub fn new(sample_rate_hz: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate_hz,
            samples,
        }
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Frame count (mono, so equal to the sample count).
    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length in milliseconds at the buffer's own rate.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate_hz == 0 {
            return 0;
        }
        (self.samples.len() as u64).saturating_mul(1000) / self.sample_rate_hz as u64
    }

    /// Multiply every sample by `gain`. Only valid before the buffer is submitted.
    pub fn scale(&mut self, gain: f32) {
        for s in &mut self.samples {
            *s *= gain;
        }
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Converts fixed-rate mono PCM16 into [`PlayableBuffer`]s.
#[derive(Clone, Copy, Debug)]
pub struct FormatConverter {
    sample_rate_hz: u32,
}

impl FormatConverter {
    /// Input channel count; the converter only handles mono.
    pub const CHANNELS: u16 = 1;

    /// Build a converter for `channels` × PCM16 at `sample_rate_hz`.
    ///
    /// Anything other than mono at a non-zero rate is rejected.
    pub fn new(sample_rate_hz: u32, channels: u16) -> Result<Self, ConversionError> {
        if sample_rate_hz == 0 || channels != Self::CHANNELS {
            return Err(ConversionError::UnsupportedFormat {
                channels,
                rate_hz: sample_rate_hz,
            });
        }
        Ok(Self { sample_rate_hz })
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Convert raw little-endian PCM16 bytes.
    ///
    /// An empty chunk yields an empty buffer. A trailing odd byte fails the whole chunk; no
    /// partial buffer is produced.
    pub fn convert(&self, bytes: &[u8]) -> Result<PlayableBuffer, ConversionError> {
        if bytes.len() % 2 != 0 {
            return Err(ConversionError::TruncatedSample { len: bytes.len() });
        }
        let frames = bytes.len() / 2;
        let mut samples: Vec<f32> = Vec::new();
        samples
            .try_reserve_exact(frames)
            .map_err(|_| ConversionError::Allocation { frames })?;
        samples.extend(
            bytes
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]).to_sample::<f32>()),
        );
        Ok(PlayableBuffer::new(self.sample_rate_hz, samples))
    }

    /// Decode and convert in one step.
    pub fn convert_payload(&self, payload: ChunkPayload) -> Result<PlayableBuffer, ChunkError> {
        let bytes = payload.into_pcm_bytes()?;
        Ok(self.convert(&bytes)?)
    }
}

/// Little-endian PCM16 bytes for `samples`; the inverse of [`FormatConverter::convert`].
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter() -> FormatConverter {
        FormatConverter::new(24_000, 1).unwrap()
    }

    #[test]
    fn convert_maps_full_scale_values() {
        let bytes = pcm16_to_bytes(&[0, i16::MIN, 16_384]);
        let buf = converter().convert(&bytes).unwrap();
        assert_eq!(buf.samples(), &[0.0, -1.0, 0.5]);
        assert_eq!(buf.sample_rate_hz(), 24_000);
    }

    #[test]
    fn convert_rejects_odd_length() {
        let err = converter().convert(&[0, 1, 2]).unwrap_err();
        assert_eq!(err, ConversionError::TruncatedSample { len: 3 });
    }

    #[test]
    fn convert_empty_chunk_is_empty_buffer() {
        let buf = converter().convert(&[]).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.duration_ms(), 0);
    }

    #[test]
    fn new_rejects_unsupported_format_pairs() {
        assert!(FormatConverter::new(0, 1).is_err());
        assert_eq!(
            FormatConverter::new(24_000, 2).unwrap_err(),
            ConversionError::UnsupportedFormat {
                channels: 2,
                rate_hz: 24_000
            }
        );
    }

    #[test]
    fn convert_payload_decodes_base64() {
        let text = encode_base64(&pcm16_to_bytes(&[16_384, -16_384]));
        let buf = converter().convert_payload(ChunkPayload::from(text)).unwrap();
        assert_eq!(buf.samples(), &[0.5, -0.5]);
    }

    #[test]
    fn convert_payload_reports_bad_base64() {
        let err = converter()
            .convert_payload(ChunkPayload::from("not base64!"))
            .unwrap_err();
        assert!(matches!(err, ChunkError::Decode(DecodeError::Base64(_))));
    }

    #[test]
    fn decode_base64_trims_whitespace() {
        let bytes = decode_base64("  AAE=\n").unwrap();
        assert_eq!(bytes, vec![0x00, 0x01]);
    }

    #[test]
    fn scale_and_duration() {
        let mut buf = PlayableBuffer::new(1_000, vec![1.0; 500]);
        buf.scale(0.5);
        assert!(buf.samples().iter().all(|s| *s == 0.5));
        assert_eq!(buf.duration_ms(), 500);
        assert_eq!(buf.frames(), 500);
    }
}
