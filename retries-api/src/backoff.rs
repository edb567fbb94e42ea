//! Backoff strategies
//!
//! Pure delay computation from an attempt number. Jittered variants draw
//! from a uniform random source; everything else is deterministic.
//!
//! Attempt numbers start at 1. The first attempt of a call never waits, so
//! every variant yields zero for attempt 1. For attempt `n >= 2`:
//! - `Immediate`: zero
//! - `FixedDelay(d)`: uniform in `[0, d]`
//! - `FixedDelayWithoutJitter(d)`: `d`
//! - `ExponentialDelay(base, max)`: uniform in `[0, min(max, base * 2^(n-2))]`
//! - `ExponentialDelayWithoutJitter(base, max)`: `min(max, base * 2^(n-2))`

use crate::error::{Result, RetryError};
use rand::Rng;
use std::fmt;
use std::time::Duration;

/// Default base delay of the standard strategy.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay of the standard strategy.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Do not back off: retry immediately.
    Immediate,
    /// Wait a random period between zero and `delay`.
    FixedDelay { delay: Duration },
    /// Wait exactly `delay`.
    FixedDelayWithoutJitter { delay: Duration },
    /// Wait a random period between zero and an exponentially growing
    /// ceiling.
    ExponentialDelay { base: Duration, max: Duration },
    /// Wait an exponentially growing period.
    ExponentialDelayWithoutJitter { base: Duration, max: Duration },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::exponential_delay(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl BackoffStrategy {
    pub fn retry_immediately() -> Self {
        BackoffStrategy::Immediate
    }

    pub fn fixed_delay(delay: Duration) -> Self {
        BackoffStrategy::FixedDelay { delay }
    }

    pub fn fixed_delay_without_jitter(delay: Duration) -> Self {
        BackoffStrategy::FixedDelayWithoutJitter { delay }
    }

    pub fn exponential_delay(base: Duration, max: Duration) -> Self {
        BackoffStrategy::ExponentialDelay { base, max }
    }

    pub fn exponential_delay_without_jitter(base: Duration, max: Duration) -> Self {
        BackoffStrategy::ExponentialDelayWithoutJitter { base, max }
    }

    /// Reject configurations whose ceiling is below their base.
    pub fn validate(&self) -> Result<()> {
        match *self {
            BackoffStrategy::ExponentialDelay { base, max }
            | BackoffStrategy::ExponentialDelayWithoutJitter { base, max }
                if max < base =>
            {
                Err(RetryError::invalid_argument(format!(
                    "max delay {max:?} is smaller than base delay {base:?}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Delay to wait before `attempt` is executed, using the thread-local
    /// random source for jitter.
    pub fn compute_delay(&self, attempt: u32) -> Result<Duration> {
        self.compute_delay_with(attempt, &mut rand::rng())
    }

    /// Same as [`BackoffStrategy::compute_delay`] with an explicit random
    /// source.
    pub fn compute_delay_with<R: Rng>(&self, attempt: u32, rng: &mut R) -> Result<Duration> {
        if attempt < 1 {
            return Err(RetryError::invalid_argument(format!(
                "attempt must be >= 1, got {attempt}"
            )));
        }
        if attempt == 1 {
            return Ok(Duration::ZERO);
        }

        let delay = match *self {
            BackoffStrategy::Immediate => Duration::ZERO,
            BackoffStrategy::FixedDelay { delay } => uniform_up_to(rng, delay),
            BackoffStrategy::FixedDelayWithoutJitter { delay } => delay,
            BackoffStrategy::ExponentialDelay { base, max } => {
                uniform_up_to(rng, exponential_ceiling(base, max, attempt))
            }
            BackoffStrategy::ExponentialDelayWithoutJitter { base, max } => {
                exponential_ceiling(base, max, attempt)
            }
        };
        Ok(delay)
    }
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffStrategy::Immediate => write!(f, "immediate"),
            BackoffStrategy::FixedDelay { delay } => write!(f, "fixed({delay:?}, jitter)"),
            BackoffStrategy::FixedDelayWithoutJitter { delay } => write!(f, "fixed({delay:?})"),
            BackoffStrategy::ExponentialDelay { base, max } => {
                write!(f, "exponential(base={base:?}, max={max:?}, jitter)")
            }
            BackoffStrategy::ExponentialDelayWithoutJitter { base, max } => {
                write!(f, "exponential(base={base:?}, max={max:?})")
            }
        }
    }
}

/// `min(max, base * 2^(attempt-2))`, saturating at `max` on overflow.
fn exponential_ceiling(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(2);
    1u32.checked_shl(exponent)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(max, |delay| delay.min(max))
}

fn uniform_up_to<R: Rng>(rng: &mut R, ceiling: Duration) -> Duration {
    let nanos = u64::try_from(ceiling.as_nanos()).unwrap_or(u64::MAX);
    Duration::from_nanos(rng.random_range(0..=nanos))
}
