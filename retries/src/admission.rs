//! Checks shared by every strategy before a retry is granted
//!
//! Order matters: the predicate and attempt-count checks only read the
//! token, so a refusal there leaves the budget untouched. Only a request
//! that passes both may withdraw from the scope's bucket.

use crate::predicate::RetryPredicate;
use crate::token_bucket::{RetryBudgetConfig, TokenBucketStore};
use retries_api::{
    ClassifiedFailure, RecordSuccessResponse, RefreshRetryTokenRequest, Result, RetryError,
    RetryErrorType, RetryToken,
};
use std::time::Duration;

/// Default total attempts per call, first attempt included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Builder fields common to all strategies.
#[derive(Debug, Clone)]
pub(crate) struct AdmissionOptions {
    pub(crate) max_attempts: u32,
    pub(crate) predicate: RetryPredicate,
    pub(crate) circuit_breaker_enabled: bool,
    pub(crate) budget: RetryBudgetConfig,
}

impl Default for AdmissionOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            predicate: RetryPredicate::new(),
            circuit_breaker_enabled: true,
            budget: RetryBudgetConfig::default(),
        }
    }
}

impl AdmissionOptions {
    pub(crate) fn build(self) -> Result<Admission> {
        if self.max_attempts == 0 {
            return Err(RetryError::InvalidArgument(
                "max_attempts must be >= 1".to_string(),
            ));
        }
        Ok(Admission {
            buckets: TokenBucketStore::new(self.budget.initial_capacity),
            options: self,
        })
    }
}

/// A retry that passed every check.
#[derive(Debug)]
pub(crate) struct Admitted {
    pub(crate) token: RetryToken,
    pub(crate) failure: ClassifiedFailure,
    pub(crate) suggested_delay: Option<Duration>,
}

#[derive(Debug)]
pub(crate) struct Admission {
    options: AdmissionOptions,
    buckets: TokenBucketStore,
}

impl Admission {
    pub(crate) fn options(&self) -> &AdmissionOptions {
        &self.options
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.options.max_attempts
    }

    pub(crate) fn admit(&self, request: RefreshRetryTokenRequest) -> Result<Admitted> {
        let RefreshRetryTokenRequest {
            token,
            failure,
            suggested_delay,
        } = request;
        let scope = token.scope();
        let error_type = failure.error_type();

        if !self.options.predicate.test(&failure) {
            tracing::debug!(scope, %error_type, "failure is not retryable");
            return Err(RetryError::NonRetryableFailure {
                scope: scope.to_string(),
                error_type,
            });
        }

        let attempts_made = token.attempts_made();
        let max_attempts = self.options.max_attempts;
        if attempts_made >= max_attempts {
            tracing::debug!(scope, attempts_made, max_attempts, "retries exhausted");
            return Err(RetryError::RetriesExhausted {
                scope: scope.to_string(),
                attempts_made,
                max_attempts,
            });
        }

        let cost = self.retry_cost(error_type);
        if cost > 0 && !self.buckets.bucket(scope).try_acquire(cost) {
            tracing::warn!(scope, cost, "retry budget exhausted, circuit open");
            return Err(RetryError::CircuitOpen {
                scope: scope.to_string(),
            });
        }

        tracing::debug!(
            scope,
            %error_type,
            attempt = attempts_made + 1,
            cost,
            "retry admitted"
        );
        Ok(Admitted {
            token: token.next_attempt(cost),
            failure,
            suggested_delay,
        })
    }

    /// Budget withdrawn by one retry. Client errors and disabled circuit
    /// breaking cost nothing.
    fn retry_cost(&self, error_type: RetryErrorType) -> u32 {
        if !self.options.circuit_breaker_enabled || error_type == RetryErrorType::ClientError {
            0
        } else {
            self.options.budget.retry_cost
        }
    }

    pub(crate) fn record_success(&self, token: &RetryToken) -> RecordSuccessResponse {
        if !self.options.circuit_breaker_enabled {
            return RecordSuccessResponse { credited: 0 };
        }

        let credited = self.options.budget.credit_for(token.budget_debited());
        let capacity = self.buckets.bucket(token.scope()).release(credited);
        tracing::debug!(
            scope = token.scope(),
            attempts_made = token.attempts_made(),
            credited,
            capacity,
            "call succeeded"
        );
        RecordSuccessResponse { credited }
    }

    pub(crate) fn available_capacity(&self, scope: &str) -> u32 {
        self.buckets.available(scope)
    }

    pub(crate) fn evict_scope(&self, scope: &str) -> bool {
        self.buckets.evict(scope)
    }
}

/// Never wait less than the server asked for.
pub(crate) fn honor_suggested_delay(computed: Duration, suggested: Option<Duration>) -> Duration {
    suggested.map_or(computed, |suggested| suggested.max(computed))
}

/// Builder methods shared by every strategy builder. The builder must have
/// an `options: AdmissionOptions` field.
macro_rules! admission_builder_methods {
    () => {
        /// Total attempts per call, first attempt included. Defaults to 3.
        pub fn max_attempts(mut self, max_attempts: u32) -> Self {
            self.options.max_attempts = max_attempts;
            self
        }

        /// Whether retries draw from the per-scope budget. Defaults to
        /// `true`.
        ///
        /// The budget is local to the built strategy, so it only helps when
        /// one strategy is reused for every call to the same resource.
        pub fn circuit_breaker_enabled(mut self, enabled: bool) -> Self {
            self.options.circuit_breaker_enabled = enabled;
            self
        }

        pub fn retry_budget(mut self, budget: $crate::token_bucket::RetryBudgetConfig) -> Self {
            self.options.budget = budget;
            self
        }

        pub fn initial_capacity(mut self, capacity: u32) -> Self {
            self.options.budget.initial_capacity = capacity;
            self
        }

        pub fn retry_cost(mut self, cost: u32) -> Self {
            self.options.budget.retry_cost = cost;
            self
        }

        pub fn success_credit(mut self, credit: u32) -> Self {
            self.options.budget.success_credit = credit;
            self
        }

        pub fn success_credit_policy(mut self, policy: $crate::token_bucket::SuccessCredit) -> Self {
            self.options.budget.success_credit_policy = policy;
            self
        }

        /// Replace the retry predicate wholesale.
        pub fn retry_predicate(mut self, predicate: $crate::predicate::RetryPredicate) -> Self {
            self.options.predicate = predicate;
            self
        }

        pub fn retry_on<F>(mut self, matcher: F) -> Self
        where
            F: Fn(&retries_api::ClassifiedFailure) -> bool + Send + Sync + 'static,
        {
            self.options.predicate = self.options.predicate.or_matching(matcher);
            self
        }

        pub fn retry_on_error_type(mut self, error_type: retries_api::RetryErrorType) -> Self {
            self.options.predicate = self.options.predicate.or_error_type(error_type);
            self
        }

        pub fn retry_on_error_type_or_cause(
            mut self,
            error_type: retries_api::RetryErrorType,
        ) -> Self {
            self.options.predicate = self.options.predicate.or_error_type_or_cause(error_type);
            self
        }

        pub fn retry_on_root_cause(mut self, error_type: retries_api::RetryErrorType) -> Self {
            self.options.predicate = self.options.predicate.or_root_cause(error_type);
            self
        }

        pub fn retry_on_code(mut self, code: impl Into<String>) -> Self {
            self.options.predicate = self.options.predicate.or_code(code);
            self
        }

        pub fn retry_on_code_or_cause(mut self, code: impl Into<String>) -> Self {
            self.options.predicate = self.options.predicate.or_code_or_cause(code);
            self
        }

        pub fn retry_on_root_cause_code(mut self, code: impl Into<String>) -> Self {
            self.options.predicate = self.options.predicate.or_root_cause_code(code);
            self
        }
    };
}

pub(crate) use admission_builder_methods;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn admission(options: AdmissionOptions) -> Admission {
        options.build().unwrap()
    }

    fn refresh(token: RetryToken, error_type: RetryErrorType) -> RefreshRetryTokenRequest {
        RefreshRetryTokenRequest::new(token, error_type)
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let err = AdmissionOptions {
            max_attempts: 0,
            ..Default::default()
        }
        .build()
        .unwrap_err();
        assert!(matches!(err, RetryError::InvalidArgument(_)));
    }

    #[test]
    fn test_predicate_checked_before_attempts() {
        let admission = admission(AdmissionOptions {
            max_attempts: 1,
            ..Default::default()
        });
        let err = admission
            .admit(refresh(RetryToken::initial("s"), RetryErrorType::ClientError))
            .unwrap_err();
        assert!(matches!(err, RetryError::NonRetryableFailure { .. }));
    }

    #[test]
    fn test_attempts_checked_before_budget() {
        let admission = admission(AdmissionOptions {
            max_attempts: 1,
            budget: RetryBudgetConfig {
                initial_capacity: 0,
                ..Default::default()
            },
            ..Default::default()
        });
        let err = admission
            .admit(refresh(RetryToken::initial("s"), RetryErrorType::Transient))
            .unwrap_err();
        assert!(matches!(err, RetryError::RetriesExhausted { .. }));
    }

    #[test]
    fn test_client_error_retry_is_free() {
        let admission = admission(AdmissionOptions {
            predicate: RetryPredicate::new().or_error_type(RetryErrorType::ClientError),
            budget: RetryBudgetConfig {
                initial_capacity: 0,
                ..Default::default()
            },
            ..Default::default()
        });
        let admitted = admission
            .admit(refresh(RetryToken::initial("s"), RetryErrorType::ClientError))
            .unwrap();
        assert_eq!(admitted.token.budget_debited(), 0);
        assert_eq!(admitted.token.attempts_made(), 2);
    }

    #[test]
    fn test_disabled_circuit_breaker_never_debits() {
        let admission = admission(AdmissionOptions {
            circuit_breaker_enabled: false,
            max_attempts: 10,
            budget: RetryBudgetConfig {
                initial_capacity: 5,
                ..Default::default()
            },
            ..Default::default()
        });
        let mut token = RetryToken::initial("s");
        for _ in 0..5 {
            token = admission
                .admit(refresh(token, RetryErrorType::Throttling))
                .unwrap()
                .token;
        }
        assert_eq!(token.budget_debited(), 0);
        assert_eq!(admission.available_capacity("s"), 5);
        assert_eq!(admission.record_success(&token).credited, 0);
    }

    #[test]
    fn test_honor_suggested_delay() {
        let one = Duration::from_secs(1);
        let five = Duration::from_secs(5);
        assert_eq!(honor_suggested_delay(one, Some(five)), five);
        assert_eq!(honor_suggested_delay(five, Some(one)), five);
        assert_eq!(honor_suggested_delay(one, None), one);
    }
}
