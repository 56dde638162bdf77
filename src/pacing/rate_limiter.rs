//! Rolling-window throughput ceiling for one session.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Sliding log of check start times bounded by `max_per_window`.
///
/// A check may start only while fewer than `max_per_window` starts lie
/// inside the trailing `window`. When full, the caller pauses until the
/// oldest start ages out; work is never dropped.
#[derive(Debug, Clone)]
pub struct RateWindow {
    starts: VecDeque<Instant>,
    max_per_window: usize,
    window: Duration,
}

impl RateWindow {
    /// Create a window allowing `max_per_window` starts per `window`.
    #[must_use]
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        let max_per_window = usize::try_from(max_per_window).unwrap_or(usize::MAX).max(1);
        Self {
            starts: VecDeque::with_capacity(max_per_window.min(4_096)),
            max_per_window,
            window,
        }
    }

    /// Drop starts that have aged out of the window ending at `now`.
    fn expire(&mut self, now: Instant) {
        while let Some(&oldest) = self.starts.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.starts.pop_front();
            } else {
                break;
            }
        }
    }

    /// Check whether a start is allowed at `now`.
    ///
    /// # Errors
    ///
    /// Returns the pause needed before the next start when the window is
    /// full. The pause never exceeds the window length.
    pub fn reserve(&mut self, now: Instant) -> Result<(), Duration> {
        self.expire(now);
        if self.starts.len() < self.max_per_window {
            return Ok(());
        }
        let oldest = self.starts.front().copied().unwrap_or(now);
        let elapsed = now.saturating_duration_since(oldest);
        Err(self.window.saturating_sub(elapsed))
    }

    /// Record a check start at `now`.
    pub fn record(&mut self, now: Instant) {
        self.expire(now);
        self.starts.push_back(now);
    }

    /// Whether a start at `now` would have to wait.
    #[must_use]
    pub fn is_limited(&self, now: Instant) -> bool {
        self.count_in_window(now) >= self.max_per_window
    }

    /// Number of starts inside the window ending at `now`.
    #[must_use]
    pub fn count_in_window(&self, now: Instant) -> usize {
        self.starts
            .iter()
            .filter(|&&start| now.saturating_duration_since(start) < self.window)
            .count()
    }

    /// Oldest start still tracked; the beginning of the current window.
    #[must_use]
    pub fn window_start(&self) -> Option<Instant> {
        self.starts.front().copied()
    }

    /// Configured ceiling.
    #[must_use]
    pub fn max_per_window(&self) -> usize {
        self.max_per_window
    }

    /// Configured window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}
