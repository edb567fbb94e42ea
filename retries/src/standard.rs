//! Standard retry strategy: attempt-indexed backoff plus a per-scope retry
//! budget

use crate::admission::{Admission, AdmissionOptions, admission_builder_methods, honor_suggested_delay};
use retries_api::{
    AcquireInitialTokenResponse, BackoffStrategy, RecordSuccessResponse, RefreshRetryTokenRequest,
    RefreshRetryTokenResponse, Result, RetryStrategy, RetryToken,
};
use std::time::Duration;

/// Retry strategy with static backoff and circuit breaking.
///
/// Reuse one instance for every call against the same resource; budgets are
/// tracked per scope inside the instance and are not shared with other
/// instances.
///
/// # Example
///
/// ```
/// use retries::StandardRetryStrategy;
/// use retries_api::{RefreshRetryTokenRequest, RetryErrorType, RetryStrategy};
///
/// let strategy = StandardRetryStrategy::builder()
///     .max_attempts(4)
///     .retry_on_error_type(RetryErrorType::Transient)
///     .retry_on_error_type(RetryErrorType::Throttling)
///     .build()
///     .unwrap();
///
/// let initial = strategy.acquire_initial_token("dynamodb");
/// let refreshed = strategy
///     .refresh_retry_token(RefreshRetryTokenRequest::new(
///         initial.token,
///         RetryErrorType::Throttling,
///     ))
///     .unwrap();
/// assert_eq!(refreshed.token.attempts_made(), 2);
/// ```
#[derive(Debug)]
pub struct StandardRetryStrategy {
    admission: Admission,
    backoff: BackoffStrategy,
}

impl StandardRetryStrategy {
    pub fn builder() -> StandardRetryStrategyBuilder {
        StandardRetryStrategyBuilder::default()
    }

    /// Builder preloaded with this strategy's configuration. The strategy it
    /// builds starts with fresh budgets.
    pub fn to_builder(&self) -> StandardRetryStrategyBuilder {
        StandardRetryStrategyBuilder {
            options: self.admission.options().clone(),
            backoff: self.backoff,
        }
    }

    pub fn backoff_strategy(&self) -> BackoffStrategy {
        self.backoff
    }

    pub fn circuit_breaker_enabled(&self) -> bool {
        self.admission.options().circuit_breaker_enabled
    }

    /// Budget currently left for `scope`.
    pub fn available_capacity(&self, scope: &str) -> u32 {
        self.admission.available_capacity(scope)
    }

    /// Drop the budget kept for `scope`. The next use recreates it full.
    pub fn evict_scope(&self, scope: &str) -> bool {
        self.admission.evict_scope(scope)
    }
}

impl RetryStrategy for StandardRetryStrategy {
    fn acquire_initial_token(&self, scope: &str) -> AcquireInitialTokenResponse {
        tracing::trace!(scope, "initial token acquired");
        AcquireInitialTokenResponse {
            token: RetryToken::initial(scope),
            delay: Duration::ZERO,
        }
    }

    fn refresh_retry_token(
        &self,
        request: RefreshRetryTokenRequest,
    ) -> Result<RefreshRetryTokenResponse> {
        // Anything fallible runs before admission, which may debit the budget.
        let next_attempt = request.token.attempts_made().saturating_add(1);
        let computed = self.backoff.compute_delay(next_attempt)?;
        let admitted = self.admission.admit(request)?;
        let delay = honor_suggested_delay(computed, admitted.suggested_delay);
        tracing::debug!(
            scope = admitted.token.scope(),
            attempt = admitted.token.attempts_made(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "retry scheduled"
        );
        Ok(RefreshRetryTokenResponse {
            token: admitted.token,
            delay,
        })
    }

    fn record_success(&self, token: RetryToken) -> RecordSuccessResponse {
        self.admission.record_success(&token)
    }

    fn max_attempts(&self) -> u32 {
        self.admission.max_attempts()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StandardRetryStrategyBuilder {
    options: AdmissionOptions,
    backoff: BackoffStrategy,
}

impl StandardRetryStrategyBuilder {
    admission_builder_methods!();

    /// Backoff between attempts. Defaults to jittered exponential backoff
    /// with a 1s base and a 20s ceiling.
    pub fn backoff_strategy(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn build(self) -> Result<StandardRetryStrategy> {
        self.backoff.validate()?;
        let backoff = self.backoff;
        let admission = self.options.build()?;
        tracing::info!(
            max_attempts = admission.max_attempts(),
            retry_predicate = ?admission.options().predicate,
            backoff = %backoff,
            circuit_breaker_enabled = admission.options().circuit_breaker_enabled,
            "standard retry strategy built"
        );
        Ok(StandardRetryStrategy { admission, backoff })
    }
}
