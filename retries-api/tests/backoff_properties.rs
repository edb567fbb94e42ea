//! Backoff properties checked across many attempts and samples.

use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use retries_api::{BackoffStrategy, RetryError};
use std::time::Duration;

const ALL_KINDS: [BackoffStrategy; 5] = [
    BackoffStrategy::Immediate,
    BackoffStrategy::FixedDelay {
        delay: Duration::from_millis(300),
    },
    BackoffStrategy::FixedDelayWithoutJitter {
        delay: Duration::from_millis(300),
    },
    BackoffStrategy::ExponentialDelay {
        base: Duration::from_millis(100),
        max: Duration::from_secs(5),
    },
    BackoffStrategy::ExponentialDelayWithoutJitter {
        base: Duration::from_millis(100),
        max: Duration::from_secs(5),
    },
];

#[test]
fn first_attempt_never_waits() {
    for backoff in ALL_KINDS {
        assert_eq!(
            backoff.compute_delay(1).expect("attempt 1 is valid"),
            Duration::ZERO,
            "{backoff}"
        );
    }
}

#[test]
fn attempt_zero_is_rejected() {
    for backoff in ALL_KINDS {
        assert!(matches!(
            backoff.compute_delay(0),
            Err(RetryError::InvalidArgument(_))
        ));
    }
}

#[test]
fn exponential_without_jitter_doubles_then_caps() {
    let base = Duration::from_millis(100);
    let max = Duration::from_secs(5);
    let backoff = BackoffStrategy::exponential_delay_without_jitter(base, max);

    for attempt in 2..=64u32 {
        let expected = base
            .checked_mul(1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX))
            .map_or(max, |delay| delay.min(max));
        assert_eq!(
            backoff.compute_delay(attempt).expect("valid attempt"),
            expected,
            "attempt {attempt}"
        );
    }
    assert_eq!(backoff.compute_delay(u32::MAX).expect("valid attempt"), max);
}

#[test]
fn fixed_jitter_stays_within_bounds() {
    let delay = Duration::from_millis(300);
    let backoff = BackoffStrategy::fixed_delay(delay);
    let mut rng = StdRng::seed_from_u64(7);
    let mut saw_short = false;
    let mut saw_long = false;

    for i in 0..10_000u32 {
        let attempt = 2 + i % 50;
        let sample = backoff
            .compute_delay_with(attempt, &mut rng)
            .expect("valid attempt");
        assert!(sample <= delay, "{sample:?} above {delay:?}");
        saw_short |= sample < delay / 4;
        saw_long |= sample > delay * 3 / 4;
    }
    assert!(saw_short && saw_long, "jitter should spread across the range");
}

#[test]
fn exponential_jitter_stays_under_ceiling() {
    let base = Duration::from_millis(100);
    let max = Duration::from_secs(2);
    let backoff = BackoffStrategy::exponential_delay(base, max);
    let mut rng = StdRng::seed_from_u64(42);

    for attempt in 2..=40u32 {
        let ceiling = base
            .checked_mul(1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX))
            .map_or(max, |delay| delay.min(max));
        for _ in 0..200 {
            let sample = backoff
                .compute_delay_with(attempt, &mut rng)
                .expect("valid attempt");
            assert!(sample <= ceiling, "attempt {attempt}: {sample:?} > {ceiling:?}");
        }
    }
}
