//! Retry policies: attempt counts and backoff schedules.

use std::sync::Arc;
use std::time::Duration;

/// Computes the delay before the next attempt from the index of the
/// attempt that just failed and the policy's base delay.
pub type BackoffFn = Arc<dyn Fn(u32, Duration) -> Duration + Send + Sync>;

/// Backoff schedule between attempts.
#[derive(Clone, Default)]
pub enum Backoff {
    /// The base delay before every retry.
    #[default]
    Fixed,

    /// The delay grows linearly: `delay * (attempt + 1)`.
    Linear,

    /// The delay doubles with each retry: `delay * 2^attempt`.
    Exponential,

    /// A caller-provided schedule.
    Custom(BackoffFn),
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backoff::Fixed => write!(f, "Fixed"),
            Backoff::Linear => write!(f, "Linear"),
            Backoff::Exponential => write!(f, "Exponential"),
            Backoff::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Policy governing a retry run.
///
/// The default policy makes a single attempt with no waiting.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt.
    pub count: u32,

    /// Base delay between attempts.
    pub delay: Duration,

    /// Backoff schedule applied to the base delay.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Create the default single-attempt policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of retries after the initial attempt.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Set the base delay between attempts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the backoff schedule.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Total number of attempts the policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.count.saturating_add(1)
    }

    /// Delay to wait after the given attempt fails.
    ///
    /// Arithmetic saturates rather than overflowing for large attempt
    /// indices.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Linear => self.delay.saturating_mul(attempt.saturating_add(1)),
            Backoff::Exponential => self
                .delay
                .saturating_mul(2u32.checked_pow(attempt).unwrap_or(u32::MAX)),
            Backoff::Custom(f) => f(attempt, self.delay),
        }
    }
}
