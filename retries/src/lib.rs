//! Retry admission control
//!
//! Strategies decide whether a failed attempt may be retried and how long
//! to wait first. They never run the operation themselves; callers drive
//! the three-call protocol of [`retries_api::RetryStrategy`], or hand the
//! loop to [`executor`].
//!
//! Two strategies are provided:
//! - [`StandardRetryStrategy`]: backoff by attempt number.
//! - [`AdaptiveRetryStrategy`]: backoff by a per-scope send-rate limiter that
//!   reacts to throttling.
//!
//! Both share one admission pipeline: a retry predicate, a maximum attempt
//! count, and a per-scope token bucket that opens the circuit when a scope
//! keeps failing.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod adaptive;
mod admission;
pub mod clock;
pub mod config;
pub mod executor;
pub mod predicate;
pub mod rate_limiter;
mod scope_map;
pub mod standard;
pub mod token_bucket;

pub use adaptive::{AdaptiveRetryStrategy, AdaptiveRetryStrategyBuilder};
pub use admission::DEFAULT_MAX_ATTEMPTS;
pub use clock::{Clock, ManualClock, SystemClock};
pub use executor::{ExecutionError, execute_with_retries, execute_with_retries_sync};
pub use predicate::RetryPredicate;
pub use rate_limiter::RateLimiterConfig;
pub use standard::{StandardRetryStrategy, StandardRetryStrategyBuilder};
pub use token_bucket::{RetryBudgetConfig, SuccessCredit, TokenBucket};

pub use retries_api;

/// Builder for the standard strategy with every setting at its default.
pub fn standard_strategy_builder() -> StandardRetryStrategyBuilder {
    StandardRetryStrategy::builder()
}

/// Builder for the adaptive strategy with every setting at its default.
pub fn adaptive_strategy_builder() -> AdaptiveRetryStrategyBuilder {
    AdaptiveRetryStrategy::builder()
}
