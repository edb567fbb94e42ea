//! Failure classification consumed by retry strategies
//!
//! Strategies never look at raw transport errors. Callers (or the transport
//! layer) classify a failure into a [`ClassifiedFailure`] and hand that to
//! the strategy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Coarse category of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryErrorType {
    /// Connection level error such as a socket timeout, connect error or TLS
    /// negotiation timeout. Usually unsafe for non-idempotent requests since
    /// the server may have applied the operation.
    Transient,

    /// The server explicitly told the client to back off (HTTP 429, 503).
    Throttling,

    /// A server error that isn't explicit throttling but is still considered
    /// retryable.
    ServerError,

    /// Does not count against any budget (e.g. an HTTP 401 challenge).
    ClientError,
}

impl RetryErrorType {
    /// Every variant, in declaration order.
    pub const ALL: [RetryErrorType; 4] = [
        RetryErrorType::Transient,
        RetryErrorType::Throttling,
        RetryErrorType::ServerError,
        RetryErrorType::ClientError,
    ];

    /// Types retried when no predicate is configured.
    pub const DEFAULT_RETRYABLE: [RetryErrorType; 3] = [
        RetryErrorType::Transient,
        RetryErrorType::Throttling,
        RetryErrorType::ServerError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RetryErrorType::Transient => "transient",
            RetryErrorType::Throttling => "throttling",
            RetryErrorType::ServerError => "server_error",
            RetryErrorType::ClientError => "client_error",
        }
    }

    /// Whether the default predicate retries this type.
    pub fn is_retryable_by_default(self) -> bool {
        Self::DEFAULT_RETRYABLE.contains(&self)
    }
}

impl fmt::Display for RetryErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One link of a failure cause chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureLink {
    pub error_type: RetryErrorType,
    /// Optional identifier of the concrete failure (service error code,
    /// errno name, ...). Matchers compare it verbatim.
    pub code: Option<String>,
}

impl FailureLink {
    pub fn new(error_type: RetryErrorType) -> Self {
        Self {
            error_type,
            code: None,
        }
    }

    pub fn with_code(error_type: RetryErrorType, code: impl Into<String>) -> Self {
        Self {
            error_type,
            code: Some(code.into()),
        }
    }

    fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

/// A classified failure together with its cause chain.
///
/// The outermost failure (the one the caller observed) is always present;
/// `causes` runs from its direct cause down to the root cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFailure {
    outermost: FailureLink,
    causes: Vec<FailureLink>,
}

impl ClassifiedFailure {
    pub fn new(error_type: RetryErrorType) -> Self {
        Self {
            outermost: FailureLink::new(error_type),
            causes: Vec::new(),
        }
    }

    pub fn with_code(error_type: RetryErrorType, code: impl Into<String>) -> Self {
        Self {
            outermost: FailureLink::with_code(error_type, code),
            causes: Vec::new(),
        }
    }

    /// Append a deeper cause below the current root.
    pub fn caused_by(mut self, cause: FailureLink) -> Self {
        self.causes.push(cause);
        self
    }

    /// Append the whole chain of another failure below the current root.
    pub fn caused_by_failure(mut self, cause: ClassifiedFailure) -> Self {
        self.causes.push(cause.outermost);
        self.causes.extend(cause.causes);
        self
    }

    pub fn outermost(&self) -> &FailureLink {
        &self.outermost
    }

    /// Deepest cause, or the outermost failure when it has no causes.
    pub fn root(&self) -> &FailureLink {
        self.causes.last().unwrap_or(&self.outermost)
    }

    /// Classification of the outermost failure.
    pub fn error_type(&self) -> RetryErrorType {
        self.outermost.error_type
    }

    pub fn code(&self) -> Option<&str> {
        self.outermost.code.as_deref()
    }

    /// Causes below the outermost failure, root last.
    pub fn causes(&self) -> &[FailureLink] {
        &self.causes
    }

    /// Every link, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &FailureLink> {
        std::iter::once(&self.outermost).chain(self.causes.iter())
    }

    pub fn any_in_chain(&self, error_type: RetryErrorType) -> bool {
        self.chain().any(|link| link.error_type == error_type)
    }

    pub fn root_is(&self, error_type: RetryErrorType) -> bool {
        self.root().error_type == error_type
    }

    pub fn any_code_in_chain(&self, code: &str) -> bool {
        self.chain().any(|link| link.has_code(code))
    }

    pub fn root_has_code(&self, code: &str) -> bool {
        self.root().has_code(code)
    }
}

impl From<RetryErrorType> for ClassifiedFailure {
    fn from(error_type: RetryErrorType) -> Self {
        Self::new(error_type)
    }
}

/// Capability implemented by error types that know how to classify
/// themselves for retry decisions.
pub trait RetryClassifiable {
    fn classify(&self) -> ClassifiedFailure;

    /// Server-provided wait hint (e.g. a `Retry-After` header).
    fn suggested_delay(&self) -> Option<Duration> {
        None
    }
}

impl RetryClassifiable for ClassifiedFailure {
    fn classify(&self) -> ClassifiedFailure {
        self.clone()
    }
}

impl RetryClassifiable for RetryErrorType {
    fn classify(&self) -> ClassifiedFailure {
        ClassifiedFailure::new(*self)
    }
}
