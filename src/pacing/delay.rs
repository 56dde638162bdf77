//! Jittered inter-check pauses and rest breaks.

use std::time::Duration;

use fastrand::Rng;

use crate::config::DelayConfig;

/// Which rest break applies after a completed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestKind {
    /// Every `batch_size` completed checks.
    Short,
    /// Every `extended_batch_size` completed checks.
    Extended,
}

/// A rest break to take before the next check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestBreak {
    /// Short or extended.
    pub kind: RestKind,
    /// Total pause including jitter.
    pub duration: Duration,
}

/// Computes pauses for one session from [`DelayConfig`].
#[derive(Debug, Clone)]
pub struct DelayPolicy {
    config: DelayConfig,
}

impl DelayPolicy {
    /// Wrap a validated delay configuration.
    #[must_use]
    pub fn new(config: DelayConfig) -> Self {
        Self { config }
    }

    /// Pause before the next check: `base * U(jitter_min, jitter_max)`.
    pub fn inter_check_pause(&self, rng: &mut Rng) -> Duration {
        if self.config.base_ms == 0 {
            return Duration::ZERO;
        }
        let spread = self.config.jitter_max - self.config.jitter_min;
        let factor = self.config.jitter_min + rng.f64() * spread;
        Duration::from_millis(self.config.base_ms).mul_f64(factor)
    }

    /// Rest break due after `completed` checks on the session, if any.
    ///
    /// The extended break wins when both cadences line up.
    pub fn rest_after(&self, completed: u64, rng: &mut Rng) -> Option<RestBreak> {
        if completed == 0 {
            return None;
        }
        let due = |every: u64| every != 0 && completed % every == 0;
        let (kind, base_ms) = if due(self.config.extended_batch_size) {
            (RestKind::Extended, self.config.extended_break_ms)
        } else if due(self.config.batch_size) {
            (RestKind::Short, self.config.break_ms)
        } else {
            return None;
        };
        let jitter_ms = rng.u64(0..=self.config.break_jitter_ms);
        Some(RestBreak {
            kind,
            duration: Duration::from_millis(base_ms.saturating_add(jitter_ms)),
        })
    }
}
