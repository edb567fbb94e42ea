//! Retry strategy contracts
//!
//! Types shared by every retry strategy: failure classification, the retry
//! token, backoff computation, the error taxonomy and the
//! [`RetryStrategy`] trait itself.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod backoff;
pub mod classifier;
pub mod error;
pub mod strategy;
pub mod token;

pub use backoff::BackoffStrategy;
pub use classifier::{ClassifiedFailure, FailureLink, RetryClassifiable, RetryErrorType};
pub use error::{Result, RetryError, RetryErrorKind};
pub use strategy::{
    AcquireInitialTokenResponse, RecordSuccessResponse, RefreshRetryTokenRequest,
    RefreshRetryTokenResponse, RetryStrategy,
};
pub use token::RetryToken;
