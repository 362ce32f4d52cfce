/// Exponential backoff with a bounded attempt budget
///
/// Shared by the connection supervisor and the credential refresh
/// supervisor; only the constants differ between the two.

use std::time::Duration;

/// Retry schedule: the delay for attempt `n` (1-based) is
/// `base_delay * 2^(n-1)`, capped at `max_delay`. Once `max_attempts`
/// attempts have been consumed, `next()` returns `None` until `reset()`.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use voicelink::supervisor::BackoffPolicy;
///
/// let mut policy = BackoffPolicy::connection();
/// assert_eq!(policy.next(), Some(Duration::from_millis(1000)));
/// assert_eq!(policy.next(), Some(Duration::from_millis(2000)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay for the first attempt
    base_delay: Duration,

    /// Upper bound on any computed delay
    max_delay: Duration,

    /// Attempt budget before giving up
    max_attempts: u32,

    /// Attempts consumed since the last reset
    attempts: u32,
}

impl BackoffPolicy {
    /// Create a policy with explicit parameters
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
            attempts: 0,
        }
    }

    /// Policy used for transport reconnection: 1s base, 10s cap, 5 attempts
    pub fn connection() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_millis(10_000), 5)
    }

    /// Policy used for credential refresh retries: 1s base, 30s cap, 5 attempts
    pub fn refresh() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_millis(30_000), 5)
    }

    /// Delay for a given 1-based attempt number
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Consume one attempt and return its delay, or `None` when the
    /// budget is exhausted
    pub fn next(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.delay_for(self.attempts))
    }

    /// Clear the consumed-attempt count
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts consumed since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Attempt budget
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether the attempt budget is used up
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
