//! Fixed-delay retry policy for failed invocations.

use std::time::Duration;

/// Retry policy applied after a call fails.
///
/// The delay is constant between attempts. With no `max_attempts` the policy
/// never gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn new(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self { delay, max_attempts }
    }

    /// Unbounded retries with a fixed `delay`.
    pub fn unbounded(delay: Duration) -> Self {
        Self::new(delay, None)
    }

    /// `true` when retries are switched off by a zero delay.
    pub fn is_disabled(&self) -> bool {
        self.delay.is_zero()
    }

    /// Returns the delay to wait after `attempt` (1-based) failed, or `None`
    /// when the attempt budget is spent.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay),
        }
    }
}
