//! The three-call retry protocol
//!
//! 1. [`RetryStrategy::acquire_initial_token`] before the first attempt.
//! 2. [`RetryStrategy::refresh_retry_token`] after every failed attempt; the
//!    caller waits the returned delay before the next attempt, or gives up
//!    when an error is returned.
//! 3. [`RetryStrategy::record_success`] once the call succeeds.
//!
//! Strategies only decide. They never sleep, perform I/O or retry by
//! themselves.

use crate::classifier::{ClassifiedFailure, RetryClassifiable};
use crate::error::Result;
use crate::token::RetryToken;
use std::time::Duration;

/// Inputs to [`RetryStrategy::refresh_retry_token`].
#[derive(Debug)]
pub struct RefreshRetryTokenRequest {
    pub token: RetryToken,
    pub failure: ClassifiedFailure,
    /// Server-provided wait hint. The returned delay is never shorter.
    pub suggested_delay: Option<Duration>,
}

impl RefreshRetryTokenRequest {
    pub fn new(token: RetryToken, failure: impl Into<ClassifiedFailure>) -> Self {
        Self {
            token,
            failure: failure.into(),
            suggested_delay: None,
        }
    }

    /// Build a request from an error that classifies itself, carrying over
    /// its suggested delay.
    pub fn from_error<E>(token: RetryToken, error: &E) -> Self
    where
        E: RetryClassifiable + ?Sized,
    {
        Self {
            token,
            failure: error.classify(),
            suggested_delay: error.suggested_delay(),
        }
    }

    pub fn with_suggested_delay(mut self, delay: Duration) -> Self {
        self.suggested_delay = Some(delay);
        self
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct AcquireInitialTokenResponse {
    pub token: RetryToken,
    /// Always zero for the strategies in this workspace.
    pub delay: Duration,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RefreshRetryTokenResponse {
    pub token: RetryToken,
    /// How long the caller must wait before issuing the next attempt.
    pub delay: Duration,
}

/// Acknowledgement of [`RetryStrategy::record_success`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSuccessResponse {
    /// Amount credited back to the scope's budget.
    pub credited: u32,
}

/// Decides, attempt by attempt, whether a call may be retried and how long
/// to wait first.
///
/// Implementations are shared between concurrently running calls, so all
/// methods take `&self`.
pub trait RetryStrategy: Send + Sync {
    /// Start a logical call against `scope`. Never fails and never consults
    /// the retry budget.
    fn acquire_initial_token(&self, scope: &str) -> AcquireInitialTokenResponse;

    /// Decide whether the failed attempt described by `request` may be
    /// retried.
    fn refresh_retry_token(
        &self,
        request: RefreshRetryTokenRequest,
    ) -> Result<RefreshRetryTokenResponse>;

    /// Finish a successful call and credit the scope's budget.
    ///
    /// Consumes the token; calling it more than once per logical call is a
    /// caller error.
    fn record_success(&self, token: RetryToken) -> RecordSuccessResponse;

    /// Total attempts (first attempt included) a call may make.
    fn max_attempts(&self) -> u32;
}
