//! Retry predicates over classified failures
//!
//! A predicate is a set of matchers combined with OR. An empty set falls
//! back to the default policy: retry transient, throttling and server
//! errors, never client errors.

use retries_api::{ClassifiedFailure, RetryErrorType};
use std::fmt;
use std::sync::Arc;

type Matcher = dyn Fn(&ClassifiedFailure) -> bool + Send + Sync;

#[derive(Clone, Default)]
pub struct RetryPredicate {
    matchers: Vec<Arc<Matcher>>,
}

impl RetryPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Predicate that retries exactly the listed outermost error types.
    pub fn from_error_types<I>(types: I) -> Self
    where
        I: IntoIterator<Item = RetryErrorType>,
    {
        types
            .into_iter()
            .fold(Self::new(), |predicate, error_type| {
                predicate.or_error_type(error_type)
            })
    }

    /// Retry when `matcher` returns true.
    pub fn or_matching<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&ClassifiedFailure) -> bool + Send + Sync + 'static,
    {
        self.matchers.push(Arc::new(matcher));
        self
    }

    /// Retry when the outermost failure has `error_type`.
    pub fn or_error_type(self, error_type: RetryErrorType) -> Self {
        self.or_matching(move |failure| failure.error_type() == error_type)
    }

    /// Retry when any failure in the cause chain has `error_type`.
    pub fn or_error_type_or_cause(self, error_type: RetryErrorType) -> Self {
        self.or_matching(move |failure| failure.any_in_chain(error_type))
    }

    /// Retry when the root cause has `error_type`.
    pub fn or_root_cause(self, error_type: RetryErrorType) -> Self {
        self.or_matching(move |failure| failure.root_is(error_type))
    }

    /// Retry when the outermost failure carries `code`.
    pub fn or_code(self, code: impl Into<String>) -> Self {
        let code = code.into();
        self.or_matching(move |failure| failure.code() == Some(code.as_str()))
    }

    /// Retry when any failure in the cause chain carries `code`.
    pub fn or_code_or_cause(self, code: impl Into<String>) -> Self {
        let code = code.into();
        self.or_matching(move |failure| failure.any_code_in_chain(&code))
    }

    /// Retry when the root cause carries `code`.
    pub fn or_root_cause_code(self, code: impl Into<String>) -> Self {
        let code = code.into();
        self.or_matching(move |failure| failure.root_has_code(&code))
    }

    /// Whether no matcher was configured and the default policy applies.
    pub fn is_default(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn test(&self, failure: &ClassifiedFailure) -> bool {
        if self.matchers.is_empty() {
            return failure.error_type().is_retryable_by_default();
        }
        self.matchers.iter().any(|matcher| matcher(failure))
    }
}

impl fmt::Debug for RetryPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.matchers.is_empty() {
            f.write_str("RetryPredicate(default)")
        } else {
            write!(f, "RetryPredicate({} matchers)", self.matchers.len())
        }
    }
}
