//! Output session setup and post-conversion gain.
//!
//! ## Initialization order
//! [`SessionPolicy::configure_session`] runs exactly once per player, on the player worker
//! thread, *before* the output engine is built. A companion capture component sharing the
//! platform audio session must be created after the player has been constructed so it sees
//! the routing chosen here.

use anyhow::Result;

use crate::config::{OutputProfile, PlayerConfig};
use crate::convert::PlayableBuffer;

/// Platform routing setup plus the single post-conversion hook.
pub trait SessionPolicy: Send {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Best-effort routing/category setup. Failure is logged, never fatal.
    fn configure_session(&self) -> Result<()> {
        Ok(())
    }

    /// Adjust a freshly converted buffer before it is enqueued.
    fn post_convert(&self, buffer: &mut PlayableBuffer);
}

/// Desktop output: no routing changes, no gain correction.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardOutput;

impl SessionPolicy for StandardOutput {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn post_convert(&self, _buffer: &mut PlayableBuffer) {}
}

/// Output on platforms that boost voice playback on their own; attenuates every sample.
#[derive(Clone, Copy, Debug)]
pub struct ConstrainedOutput {
    gain: f32,
}

impl ConstrainedOutput {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl SessionPolicy for ConstrainedOutput {
    fn name(&self) -> &'static str {
        "constrained"
    }

    fn configure_session(&self) -> Result<()> {
        // cpal exposes no session category API; routing stays with the host default.
        tracing::debug!(gain = self.gain, "constrained output session: using host routing");
        Ok(())
    }

    fn post_convert(&self, buffer: &mut PlayableBuffer) {
        buffer.scale(self.gain);
    }
}

/// Policy for the configured (or target-resolved) output profile.
pub fn policy_for(config: &PlayerConfig) -> Box<dyn SessionPolicy> {
    match config.output_profile.resolve() {
        OutputProfile::Constrained => Box::new(ConstrainedOutput::new(config.constrained_gain)),
        _ => Box::new(StandardOutput),
    }
}

/// Run `configure_session`, logging instead of failing.
pub(crate) fn apply_session(policy: &dyn SessionPolicy) {
    match policy.configure_session() {
        Ok(()) => tracing::info!(policy = policy.name(), "output session configured"),
        Err(e) => tracing::warn!(policy = policy.name(), "output session setup failed: {e:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSession;

    impl SessionPolicy for FailingSession {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn configure_session(&self) -> Result<()> {
            Err(anyhow::anyhow!("category rejected"))
        }

        fn post_convert(&self, _buffer: &mut PlayableBuffer) {}
    }

    #[test]
    fn standard_output_leaves_samples_untouched() {
        let mut buf = PlayableBuffer::new(24_000, vec![0.5, -0.5]);
        StandardOutput.post_convert(&mut buf);
        assert_eq!(buf.samples(), &[0.5, -0.5]);
    }

    #[test]
    fn constrained_output_attenuates() {
        let mut buf = PlayableBuffer::new(24_000, vec![0.5, -1.0]);
        ConstrainedOutput::new(0.5).post_convert(&mut buf);
        assert_eq!(buf.samples(), &[0.25, -0.5]);
    }

    #[test]
    fn policy_for_follows_profile() {
        let cfg = PlayerConfig {
            output_profile: OutputProfile::Constrained,
            constrained_gain: 0.25,
            ..PlayerConfig::default()
        };
        assert_eq!(policy_for(&cfg).name(), "constrained");

        let cfg = PlayerConfig {
            output_profile: OutputProfile::Standard,
            ..PlayerConfig::default()
        };
        assert_eq!(policy_for(&cfg).name(), "standard");
    }

    #[test]
    fn apply_session_swallows_failures() {
        apply_session(&FailingSession);
    }
}
