//! Running history of every sample handed to playback.

use std::sync::Arc;

use crate::convert::PlayableBuffer;
use crate::wav;

/// Append-only sample history for one stream.
///
/// Mono buffers are optionally widened to interleaved stereo (`L = R`).
#[derive(Debug)]
pub struct SampleHistory {
    channels: u16,
    sample_rate_hz: u32,
    samples: Vec<f32>,
}

impl SampleHistory {
    /// `channels` must be 1 or 2; anything above 1 records interleaved stereo.
    pub fn new(sample_rate_hz: u32, channels: u16) -> Self {
        Self {
            channels: channels.clamp(1, 2),
            sample_rate_hz,
            samples: Vec::new(),
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Stored sample count (interleaved).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append a buffer's samples in arrival order.
    pub fn record(&mut self, buffer: &PlayableBuffer) {
        let src = buffer.samples();
        if self.channels == 2 {
            self.samples.reserve(src.len() * 2);
            for &s in src {
                self.samples.push(s);
                self.samples.push(s);
            }
        } else {
            self.samples.extend_from_slice(src);
        }
    }

    /// Immutable copy of everything recorded so far.
    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            channels: self.channels,
            sample_rate_hz: self.sample_rate_hz,
            samples: Arc::from(self.samples.as_slice()),
        }
    }

    /// Drop all samples (new stream).
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Exportable view of a completed stream's history.
///
/// Cheap to clone: every subscriber shares one sample allocation.
#[derive(Clone, Debug, PartialEq)]
pub struct HistorySnapshot {
    pub channels: u16,
    pub sample_rate_hz: u32,
    pub samples: Arc<[f32]>,
}

impl HistorySnapshot {
    /// Frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate_hz == 0 {
            return 0;
        }
        (self.frames() as u64).saturating_mul(1000) / self.sample_rate_hz as u64
    }

    pub fn to_pcm16(&self) -> Vec<i16> {
        wav::history_to_pcm16(&self.samples)
    }

    /// Full WAV image of the history.
    pub fn to_wav_bytes(&self) -> anyhow::Result<Vec<u8>> {
        wav::encode_wav(&self.to_pcm16(), self.channels, self.sample_rate_hz)
    }

    /// Write the history as a WAV file.
    pub fn write_wav(&self, path: &std::path::Path) -> anyhow::Result<()> {
        wav::write_wav(path, &self.to_pcm16(), self.channels, self.sample_rate_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(samples: &[f32]) -> PlayableBuffer {
        PlayableBuffer::new(24_000, samples.to_vec())
    }

    #[test]
    fn record_appends_in_arrival_order() {
        let mut history = SampleHistory::new(24_000, 1);
        history.record(&buffer(&[0.1, 0.2]));
        history.record(&buffer(&[0.3]));
        let snap = history.snapshot();
        assert_eq!(&*snap.samples, &[0.1, 0.2, 0.3]);
        assert_eq!(snap.frames(), 3);
    }

    #[test]
    fn stereo_history_duplicates_each_sample() {
        let mut history = SampleHistory::new(24_000, 2);
        history.record(&buffer(&[0.25, -0.5]));
        let snap = history.snapshot();
        assert_eq!(&*snap.samples, &[0.25, 0.25, -0.5, -0.5]);
        assert_eq!(snap.frames(), 2);
        assert_eq!(snap.channels, 2);
    }

    #[test]
    fn snapshot_is_detached_from_later_records() {
        let mut history = SampleHistory::new(24_000, 1);
        history.record(&buffer(&[1.0]));
        let snap = history.snapshot();
        history.record(&buffer(&[2.0]));
        assert_eq!(snap.samples.len(), 1);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn wav_bytes_carry_history_format() {
        let mut history = SampleHistory::new(24_000, 2);
        history.record(&buffer(&[0.0; 100]));
        let bytes = history.snapshot().to_wav_bytes().unwrap();
        let header = wav::parse_wav_header(&bytes).unwrap();
        assert_eq!(header.channels, 2);
        assert_eq!(header.sample_rate_hz, 24_000);
        assert_eq!(header.data_len, 400);
    }

    #[test]
    fn clear_empties_history_and_channel_count_is_clamped() {
        let mut history = SampleHistory::new(24_000, 6);
        assert_eq!(history.channels(), 2);
        history.record(&buffer(&[0.5]));
        history.clear();
        assert!(history.is_empty());
    }
}
