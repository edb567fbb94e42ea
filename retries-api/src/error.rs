//! Terminal decisions returned by retry strategies

use crate::classifier::RetryErrorType;
use thiserror::Error;

/// Retry API result type
pub type Result<T> = std::result::Result<T, RetryError>;

/// Why a strategy refused to hand out another token.
///
/// Every variant is terminal for the logical call: the strategy makes one
/// decision per request and never retries internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    /// The retry predicate rejected the classified failure.
    #[error("Non-retryable failure in scope '{scope}': {error_type}")]
    NonRetryableFailure {
        scope: String,
        error_type: RetryErrorType,
    },

    /// The call already made `max_attempts` attempts.
    #[error("Retries exhausted in scope '{scope}' after {attempts_made} of {max_attempts} attempts")]
    RetriesExhausted {
        scope: String,
        attempts_made: u32,
        max_attempts: u32,
    },

    /// The scope's retry budget cannot cover another retry right now.
    #[error("Retry unavailable for scope '{scope}': retry budget exhausted")]
    CircuitOpen { scope: String },

    /// Malformed input or configuration. Programmer error.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Fieldless discriminant of [`RetryError`], handy for metrics labels and
/// assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryErrorKind {
    NonRetryableFailure,
    RetriesExhausted,
    CircuitOpen,
    InvalidArgument,
}

impl RetryError {
    pub fn kind(&self) -> RetryErrorKind {
        match self {
            RetryError::NonRetryableFailure { .. } => RetryErrorKind::NonRetryableFailure,
            RetryError::RetriesExhausted { .. } => RetryErrorKind::RetriesExhausted,
            RetryError::CircuitOpen { .. } => RetryErrorKind::CircuitOpen,
            RetryError::InvalidArgument(_) => RetryErrorKind::InvalidArgument,
        }
    }

    /// Scope the decision was made for, if any.
    pub fn scope(&self) -> Option<&str> {
        match self {
            RetryError::NonRetryableFailure { scope, .. }
            | RetryError::RetriesExhausted { scope, .. }
            | RetryError::CircuitOpen { scope } => Some(scope),
            RetryError::InvalidArgument(_) => None,
        }
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        RetryError::InvalidArgument(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind_and_scope() {
        let err = RetryError::CircuitOpen {
            scope: "dynamodb".to_string(),
        };
        assert_eq!(err.kind(), RetryErrorKind::CircuitOpen);
        assert_eq!(err.scope(), Some("dynamodb"));

        let err = RetryError::invalid_argument("attempt must be >= 1");
        assert_eq!(err.kind(), RetryErrorKind::InvalidArgument);
        assert_eq!(err.scope(), None);
    }

    #[test]
    fn test_messages() {
        let err = RetryError::RetriesExhausted {
            scope: "s3".to_string(),
            attempts_made: 3,
            max_attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "Retries exhausted in scope 's3' after 3 of 3 attempts"
        );

        let err = RetryError::NonRetryableFailure {
            scope: "s3".to_string(),
            error_type: RetryErrorType::ClientError,
        };
        assert_eq!(
            err.to_string(),
            "Non-retryable failure in scope 's3': client_error"
        );
    }
}
