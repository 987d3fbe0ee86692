//! Player node + rate stage used inside the output callback.
//!
//! Reads a continuous sample stream across consecutive buffers with a fractional step, so a
//! single stage covers both the configured playback speed and a device rate that differs
//! from the stream rate. Neighbouring samples are linearly interpolated, including across
//! buffer boundaries, to keep playback gapless.

use std::collections::VecDeque;

use super::Completion;

/// One submitted buffer waiting in (or currently at the head of) the player node.
pub(crate) struct QueuedBuffer {
    pub(crate) token: Completion,
    pub(crate) samples: Vec<f32>,
}

pub(crate) struct RateStage {
    step: f64,
    pos: f64,
}

impl RateStage {
    /// `step = source_rate × playback_rate / output_rate`.
    pub(crate) fn new(source_rate_hz: u32, output_rate_hz: u32, playback_rate: f32) -> Self {
        let step = if output_rate_hz == 0 {
            1.0
        } else {
            source_rate_hz as f64 * playback_rate as f64 / output_rate_hz as f64
        };
        Self {
            step: if step.is_finite() && step > 0.0 { step } else { 1.0 },
            pos: 0.0,
        }
    }

    pub(crate) fn step(&self) -> f64 {
        self.step
    }

    pub(crate) fn reset(&mut self) {
        self.pos = 0.0;
    }

    /// Produce the next output sample, or `None` when nothing is queued (underrun).
    ///
    /// `on_done` is called with each buffer's token right after its last sample has been
    /// consumed, in queue order.
    pub(crate) fn next_sample<F>(&mut self, queue: &mut VecDeque<QueuedBuffer>, mut on_done: F) -> Option<f32>
    where
        F: FnMut(Completion),
    {
        self.retire_finished(queue, &mut on_done);
        let Some(front) = queue.front() else {
            self.pos = 0.0;
            return None;
        };

        let idx = self.pos as usize;
        let frac = (self.pos - idx as f64) as f32;
        let a = front.samples[idx];
        let b = match front.samples.get(idx + 1) {
            Some(next) => *next,
            None => queue
                .get(1)
                .and_then(|next| next.samples.first().copied())
                .unwrap_or(a),
        };

        self.pos += self.step;
        self.retire_finished(queue, &mut on_done);
        Some(a + (b - a) * frac)
    }

    fn retire_finished<F>(&mut self, queue: &mut VecDeque<QueuedBuffer>, on_done: &mut F)
    where
        F: FnMut(Completion),
    {
        while let Some(front) = queue.front() {
            let len = front.samples.len() as f64;
            if self.pos < len {
                break;
            }
            self.pos -= len;
            if let Some(done) = queue.pop_front() {
                on_done(done.token);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(id: u64, samples: &[f32]) -> QueuedBuffer {
        QueuedBuffer {
            token: Completion { generation: 0, id },
            samples: samples.to_vec(),
        }
    }

    fn drain(stage: &mut RateStage, queue: &mut VecDeque<QueuedBuffer>) -> (Vec<f32>, Vec<u64>) {
        let mut out = Vec::new();
        let mut done = Vec::new();
        while let Some(s) = stage.next_sample(queue, |c| done.push(c.id)) {
            out.push(s);
        }
        (out, done)
    }

    #[test]
    fn unity_step_passes_samples_through_gaplessly() {
        let mut stage = RateStage::new(24_000, 24_000, 1.0);
        let mut queue = VecDeque::from([queued(0, &[0.1, 0.2]), queued(1, &[0.3])]);
        let (out, done) = drain(&mut stage, &mut queue);
        assert_eq!(out, vec![0.1, 0.2, 0.3]);
        assert_eq!(done, vec![0, 1]);
    }

    #[test]
    fn completion_fires_right_after_last_sample() {
        let mut stage = RateStage::new(24_000, 24_000, 1.0);
        let mut queue = VecDeque::from([queued(7, &[0.5]), queued(8, &[0.25, 0.25])]);
        let mut done = Vec::new();
        let first = stage.next_sample(&mut queue, |c| done.push(c.id));
        assert_eq!(first, Some(0.5));
        assert_eq!(done, vec![7]);
    }

    #[test]
    fn half_step_interpolates_and_doubles_length() {
        let mut stage = RateStage::new(24_000, 48_000, 1.0);
        assert_eq!(stage.step(), 0.5);
        let mut queue = VecDeque::from([queued(0, &[0.0, 1.0])]);
        let (out, done) = drain(&mut stage, &mut queue);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.0]);
        assert_eq!(done, vec![0]);
    }

    #[test]
    fn interpolation_crosses_buffer_boundary() {
        let mut stage = RateStage::new(24_000, 48_000, 1.0);
        let mut queue = VecDeque::from([queued(0, &[0.0]), queued(1, &[1.0])]);
        let (out, _) = drain(&mut stage, &mut queue);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn double_speed_skips_samples_and_still_completes_every_buffer() {
        let mut stage = RateStage::new(24_000, 24_000, 2.0);
        let mut queue = VecDeque::from([queued(0, &[0.0, 0.1, 0.2]), queued(1, &[0.3, 0.4])]);
        let (out, done) = drain(&mut stage, &mut queue);
        assert_eq!(out.len(), 3);
        assert_eq!(done, vec![0, 1]);
    }

    #[test]
    fn empty_buffers_complete_without_output() {
        let mut stage = RateStage::new(24_000, 24_000, 1.0);
        let mut queue = VecDeque::from([queued(3, &[])]);
        let (out, done) = drain(&mut stage, &mut queue);
        assert!(out.is_empty());
        assert_eq!(done, vec![3]);
    }

    #[test]
    fn underrun_resets_position() {
        let mut stage = RateStage::new(24_000, 48_000, 1.0);
        let mut queue = VecDeque::from([queued(0, &[0.0])]);
        let _ = drain(&mut stage, &mut queue);
        queue.push_back(queued(1, &[0.75, 0.75]));
        assert_eq!(stage.next_sample(&mut queue, |_| {}), Some(0.75));
    }
}
