//! Reconnection policy for the shared chat socket.
//!
//! DESIGN
//! ======
//! The connection manager asks the policy for a delay after every socket
//! close or error. `None` means stay down until a caller invokes `connect`
//! again. Any explicit `connect`/`disconnect` cancels a scheduled retry and
//! resets the attempt counter, so callers always have a manual override.

use std::time::Duration;

use rand::Rng;

/// Jitter applied to backoff delays, as a fraction of the delay.
const BACKOFF_JITTER: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Stay disconnected after a failure.
    Never,
    /// Retry forever after a constant delay.
    Fixed { delay: Duration },
    /// Retry forever, doubling the delay per attempt up to `max`, with jitter.
    Backoff { initial: Duration, max: Duration },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Backoff { initial: Duration::from_secs(1), max: Duration::from_secs(30) }
    }
}

impl ReconnectPolicy {
    /// Base delay before retry number `attempt` (0-based), without jitter.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Option<Duration> {
        match *self {
            Self::Never => None,
            Self::Fixed { delay } => Some(delay),
            Self::Backoff { initial, max } => {
                let factor = 1_u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
                Some(initial.saturating_mul(factor).min(max))
            }
        }
    }

    /// Delay before retry number `attempt`, with jitter for backoff.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        let base = self.base_delay(attempt)?;
        match self {
            Self::Backoff { max, .. } => {
                let scale = rand::rng().random_range((1.0 - BACKOFF_JITTER)..=(1.0 + BACKOFF_JITTER));
                Some(base.mul_f64(scale).min(*max))
            }
            _ => Some(base),
        }
    }
}
