//! Adaptive retry strategy
//!
//! Same admission checks as the standard strategy, but the delay comes
//! from a per-scope send-rate limiter driven by observed throttling instead
//! of the attempt number. Suited to many independent callers sharing one
//! downstream resource.

use crate::admission::{Admission, AdmissionOptions, admission_builder_methods, honor_suggested_delay};
use crate::clock::{Clock, SystemClock};
use crate::rate_limiter::{RateLimiterConfig, RateLimiterStore};
use retries_api::{
    AcquireInitialTokenResponse, RecordSuccessResponse, RefreshRetryTokenRequest,
    RefreshRetryTokenResponse, Result, RetryErrorType, RetryStrategy, RetryToken,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct AdaptiveRetryStrategy {
    admission: Admission,
    limiters: RateLimiterStore,
    rate_config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
}

impl AdaptiveRetryStrategy {
    pub fn builder() -> AdaptiveRetryStrategyBuilder {
        AdaptiveRetryStrategyBuilder::default()
    }

    /// Builder preloaded with this strategy's configuration and clock. The
    /// strategy it builds starts with fresh budgets and rates.
    pub fn to_builder(&self) -> AdaptiveRetryStrategyBuilder {
        AdaptiveRetryStrategyBuilder {
            options: self.admission.options().clone(),
            rate_config: self.rate_config,
            clock: Some(Arc::clone(&self.clock)),
        }
    }

    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        self.rate_config
    }

    pub fn available_capacity(&self, scope: &str) -> u32 {
        self.admission.available_capacity(scope)
    }

    /// Allowed send rate for `scope` in attempts per second, or `None` if
    /// the scope has not been throttled yet.
    pub fn allowed_rate(&self, scope: &str) -> Option<f64> {
        self.limiters.allowed_rate(scope)
    }

    /// Drop the budget and rate state kept for `scope`.
    pub fn evict_scope(&self, scope: &str) -> bool {
        let bucket = self.admission.evict_scope(scope);
        let limiter = self.limiters.evict(scope);
        bucket || limiter
    }
}

impl RetryStrategy for AdaptiveRetryStrategy {
    fn acquire_initial_token(&self, scope: &str) -> AcquireInitialTokenResponse {
        self.limiters.limiter(scope).record_send(self.clock.now());
        AcquireInitialTokenResponse {
            token: RetryToken::initial(scope),
            delay: Duration::ZERO,
        }
    }

    fn refresh_retry_token(
        &self,
        request: RefreshRetryTokenRequest,
    ) -> Result<RefreshRetryTokenResponse> {
        let limiter = self.limiters.limiter(request.token.scope());
        let now = self.clock.now();

        // Every throttle lowers the rate, including ones whose retry is refused.
        if request.failure.error_type() == RetryErrorType::Throttling {
            limiter.on_throttle(now);
        }

        let admitted = self.admission.admit(request)?;
        let delay = honor_suggested_delay(limiter.reserve(now), admitted.suggested_delay);
        tracing::debug!(
            scope = admitted.token.scope(),
            attempt = admitted.token.attempts_made(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "adaptive retry scheduled"
        );
        Ok(RefreshRetryTokenResponse {
            token: admitted.token,
            delay,
        })
    }

    fn record_success(&self, token: RetryToken) -> RecordSuccessResponse {
        self.limiters.limiter(token.scope()).on_success(self.clock.now());
        self.admission.record_success(&token)
    }

    fn max_attempts(&self) -> u32 {
        self.admission.max_attempts()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdaptiveRetryStrategyBuilder {
    options: AdmissionOptions,
    rate_config: RateLimiterConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl AdaptiveRetryStrategyBuilder {
    admission_builder_methods!();

    pub fn rate_limiter(mut self, config: RateLimiterConfig) -> Self {
        self.rate_config = config;
        self
    }

    /// Time source for rate pacing. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<AdaptiveRetryStrategy> {
        self.rate_config.validate()?;
        let rate_config = self.rate_config;
        let admission = self.options.build()?;
        tracing::info!(
            max_attempts = admission.max_attempts(),
            retry_predicate = ?admission.options().predicate,
            min_rate = rate_config.min_rate,
            max_rate = rate_config.max_rate,
            circuit_breaker_enabled = admission.options().circuit_breaker_enabled,
            "adaptive retry strategy built"
        );
        Ok(AdaptiveRetryStrategy {
            admission,
            limiters: RateLimiterStore::new(rate_config),
            rate_config,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use pretty_assertions::assert_eq;
    use retries_api::RetryError;

    fn strategy(clock: Arc<ManualClock>) -> AdaptiveRetryStrategy {
        AdaptiveRetryStrategy::builder()
            .max_attempts(10)
            .rate_limiter(RateLimiterConfig {
                min_rate: 0.5,
                max_rate: 10.0,
                decrease_factor: 0.5,
                increase_step: 1.0,
                cooldown: Duration::from_secs(1),
            })
            .clock(clock)
            .build()
            .unwrap()
    }

    fn fail(token: RetryToken, error_type: RetryErrorType) -> RefreshRetryTokenRequest {
        RefreshRetryTokenRequest::new(token, error_type)
    }

    #[test]
    fn test_no_delay_before_throttling() {
        let strategy = strategy(Arc::new(ManualClock::new()));
        let mut token = strategy.acquire_initial_token("s").token;

        for _ in 0..5 {
            let response = strategy
                .refresh_retry_token(fail(token, RetryErrorType::Transient))
                .unwrap();
            assert_eq!(response.delay, Duration::ZERO);
            token = response.token;
        }
        assert_eq!(strategy.allowed_rate("s"), None);
    }

    #[test]
    fn test_throttling_paces_retries() {
        let strategy = strategy(Arc::new(ManualClock::new()));

        let token = strategy.acquire_initial_token("s").token;
        let first = strategy
            .refresh_retry_token(fail(token, RetryErrorType::Throttling))
            .unwrap();
        assert_eq!(first.delay, Duration::ZERO);
        assert_eq!(strategy.allowed_rate("s"), Some(5.0));

        // A second throttle halves again: 2.5/s -> 400ms between slots.
        let second = strategy
            .refresh_retry_token(fail(first.token, RetryErrorType::Throttling))
            .unwrap();
        assert_eq!(strategy.allowed_rate("s"), Some(2.5));
        assert_eq!(second.delay, Duration::from_millis(200));

        let third = strategy
            .refresh_retry_token(fail(second.token, RetryErrorType::Transient))
            .unwrap();
        assert_eq!(third.delay, Duration::from_millis(600));
    }

    #[test]
    fn test_success_restores_rate_after_cooldown() {
        let clock = Arc::new(ManualClock::new());
        let strategy = strategy(clock.clone());

        let token = strategy.acquire_initial_token("s").token;
        let token = strategy
            .refresh_retry_token(fail(token, RetryErrorType::Throttling))
            .unwrap()
            .token;
        strategy.record_success(token);
        assert_eq!(strategy.allowed_rate("s"), Some(5.0));

        clock.advance(Duration::from_secs(2));
        let token = strategy.acquire_initial_token("s").token;
        strategy.record_success(token);
        assert_eq!(strategy.allowed_rate("s"), Some(6.0));
    }

    #[test]
    fn test_scopes_are_independent() {
        let strategy = strategy(Arc::new(ManualClock::new()));

        let token = strategy.acquire_initial_token("hot").token;
        strategy
            .refresh_retry_token(fail(token, RetryErrorType::Throttling))
            .unwrap();

        assert_eq!(strategy.allowed_rate("hot"), Some(5.0));
        assert_eq!(strategy.allowed_rate("cold"), None);
    }

    #[test]
    fn test_same_checks_as_standard() {
        let strategy = strategy(Arc::new(ManualClock::new()))
            .to_builder()
            .max_attempts(2)
            .initial_capacity(5)
            .build()
            .unwrap();

        let token = strategy.acquire_initial_token("s").token;
        let err = strategy
            .refresh_retry_token(fail(token, RetryErrorType::ClientError))
            .unwrap_err();
        assert!(matches!(err, RetryError::NonRetryableFailure { .. }));

        let token = strategy.acquire_initial_token("s").token;
        let token = strategy
            .refresh_retry_token(fail(token, RetryErrorType::Throttling))
            .unwrap()
            .token;
        let err = strategy
            .refresh_retry_token(fail(token, RetryErrorType::Throttling))
            .unwrap_err();
        assert!(matches!(err, RetryError::RetriesExhausted { .. }));

        let token = strategy.acquire_initial_token("s").token;
        let err = strategy
            .refresh_retry_token(fail(token, RetryErrorType::Throttling))
            .unwrap_err();
        assert!(matches!(err, RetryError::CircuitOpen { .. }));
    }

    #[test]
    fn test_refused_throttle_still_lowers_rate() {
        let exhausted = strategy(Arc::new(ManualClock::new()))
            .to_builder()
            .max_attempts(1)
            .build()
            .unwrap();
        let token = exhausted.acquire_initial_token("s").token;
        let err = exhausted
            .refresh_retry_token(fail(token, RetryErrorType::Throttling))
            .unwrap_err();
        assert!(matches!(err, RetryError::RetriesExhausted { .. }));
        assert_eq!(exhausted.allowed_rate("s"), Some(5.0));

        let circuit_open = strategy(Arc::new(ManualClock::new()))
            .to_builder()
            .initial_capacity(0)
            .build()
            .unwrap();
        for _ in 0..3 {
            let token = circuit_open.acquire_initial_token("s").token;
            let err = circuit_open
                .refresh_retry_token(fail(token, RetryErrorType::Throttling))
                .unwrap_err();
            assert!(matches!(err, RetryError::CircuitOpen { .. }));
        }
        assert_eq!(circuit_open.allowed_rate("s"), Some(1.25));
        assert_eq!(circuit_open.available_capacity("s"), 0);
    }

    #[test]
    fn test_refused_non_throttle_leaves_rate_alone() {
        let strategy = strategy(Arc::new(ManualClock::new()))
            .to_builder()
            .max_attempts(1)
            .build()
            .unwrap();
        let token = strategy.acquire_initial_token("s").token;
        assert!(
            strategy
                .refresh_retry_token(fail(token, RetryErrorType::Transient))
                .is_err()
        );
        assert_eq!(strategy.allowed_rate("s"), None);
    }

    #[test]
    fn test_suggested_delay_wins_when_longer() {
        let strategy = strategy(Arc::new(ManualClock::new()));
        let token = strategy.acquire_initial_token("s").token;
        let response = strategy
            .refresh_retry_token(
                fail(token, RetryErrorType::Throttling).with_suggested_delay(Duration::from_secs(3)),
            )
            .unwrap();
        assert_eq!(response.delay, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_rate_config_rejected() {
        let err = AdaptiveRetryStrategy::builder()
            .rate_limiter(RateLimiterConfig {
                decrease_factor: 2.0,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, RetryError::InvalidArgument(_)));
    }
}
