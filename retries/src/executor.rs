//! Caller-side attempt loops
//!
//! Strategies only decide; these helpers own the loop around them. Each
//! follows the three-call protocol: acquire a token, run the attempt,
//! refresh on failure and wait the returned delay, record success at the
//! end.
//!
//! ```no_run
//! use retries::StandardRetryStrategy;
//! use retries::executor::execute_with_retries;
//! use retries_api::RetryErrorType;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() {
//! let strategy = StandardRetryStrategy::builder().build().unwrap();
//! let cancel = CancellationToken::new();
//!
//! let result = execute_with_retries(&strategy, "inventory", &cancel, || async {
//!     Err::<u32, RetryErrorType>(RetryErrorType::Transient)
//! })
//! .await;
//! # }
//! ```

use retries_api::{RefreshRetryTokenRequest, RetryClassifiable, RetryError, RetryStrategy};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Why a driven call ended without a value.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError<E> {
    /// The strategy refused another attempt. Carries the last attempt's
    /// error.
    #[error("{reason}")]
    GaveUp { reason: RetryError, last_error: E },

    /// External cancellation requested.
    #[error("Retry aborted by cancellation")]
    Aborted,
}

impl<E> ExecutionError<E> {
    /// The strategy's terminal decision, if the call gave up.
    pub fn reason(&self) -> Option<&RetryError> {
        match self {
            ExecutionError::GaveUp { reason, .. } => Some(reason),
            ExecutionError::Aborted => None,
        }
    }

    pub fn into_last_error(self) -> Option<E> {
        match self {
            ExecutionError::GaveUp { last_error, .. } => Some(last_error),
            ExecutionError::Aborted => None,
        }
    }
}

/// Run `operation` until it succeeds or `strategy` gives up, blocking the
/// current thread between attempts.
pub fn execute_with_retries_sync<S, F, T, E>(
    strategy: &S,
    scope: &str,
    mut operation: F,
) -> Result<T, ExecutionError<E>>
where
    S: RetryStrategy + ?Sized,
    F: FnMut() -> Result<T, E>,
    E: RetryClassifiable,
{
    let mut token = strategy.acquire_initial_token(scope).token;

    loop {
        match operation() {
            Ok(value) => {
                strategy.record_success(token);
                return Ok(value);
            }
            Err(err) => {
                let request = RefreshRetryTokenRequest::from_error(token, &err);
                match strategy.refresh_retry_token(request) {
                    Ok(response) => {
                        if !response.delay.is_zero() {
                            std::thread::sleep(response.delay);
                        }
                        token = response.token;
                    }
                    Err(reason) => {
                        return Err(ExecutionError::GaveUp {
                            reason,
                            last_error: err,
                        });
                    }
                }
            }
        }
    }
}

/// Async counterpart of [`execute_with_retries_sync`].
///
/// Cancellation is checked before every attempt and interrupts the wait
/// between attempts. An in-flight attempt is not interrupted.
pub async fn execute_with_retries<S, F, Fut, T, E>(
    strategy: &S,
    scope: &str,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, ExecutionError<E>>
where
    S: RetryStrategy + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClassifiable,
{
    let mut token = strategy.acquire_initial_token(scope).token;

    loop {
        if cancel.is_cancelled() {
            return Err(ExecutionError::Aborted);
        }

        match operation().await {
            Ok(value) => {
                strategy.record_success(token);
                return Ok(value);
            }
            Err(err) => {
                let request = RefreshRetryTokenRequest::from_error(token, &err);
                match strategy.refresh_retry_token(request) {
                    Ok(response) => {
                        if wait_with_cancel(cancel, response.delay).await.is_err() {
                            return Err(ExecutionError::Aborted);
                        }
                        token = response.token;
                    }
                    Err(reason) => {
                        return Err(ExecutionError::GaveUp {
                            reason,
                            last_error: err,
                        });
                    }
                }
            }
        }
    }
}

async fn wait_with_cancel(cancel: &CancellationToken, duration: Duration) -> Result<(), ()> {
    if duration.is_zero() {
        return Ok(());
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = cancel.cancelled() => Err(()),
    }
}
