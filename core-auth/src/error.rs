use crate::classifier::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Failure of the token exchange.
///
/// `Clone` so every caller waiting on the same refresh receives the same
/// error.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    /// The identity endpoint rejected the exchange or could not be reached.
    ///
    /// `cause` is the classification of the exchange outcome; the error
    /// itself is fatal to the caller unless `cause` is retryable.
    #[error("Authentication failed ({cause}): {reason}")]
    AuthenticationFailed {
        cause: ErrorKind,
        status: Option<u16>,
        reason: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("Token refresh aborted: {0}")]
    RefreshAborted(String),
}

impl AuthError {
    /// Classification of the underlying exchange outcome.
    pub fn cause(&self) -> ErrorKind {
        match self {
            AuthError::AuthenticationFailed { cause, .. } => *cause,
            AuthError::InvalidTokenResponse(_) | AuthError::RefreshAborted(_) => ErrorKind::Fatal,
        }
    }

    /// HTTP status of the token endpoint response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::AuthenticationFailed { status, .. } => *status,
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AuthError::AuthenticationFailed { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether a later exchange may succeed without any configuration change.
    pub fn is_retryable(&self) -> bool {
        self.cause().is_retryable()
    }
}

/// Terminal failure of an operation routed through the executor.
///
/// Carries the kind, the operation name and the HTTP status when there was
/// one. Never carries tokens, secrets or response bodies.
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("Operation '{operation}' failed ({kind}): {message}")]
    Failed {
        operation: String,
        kind: ErrorKind,
        status: Option<u16>,
        message: String,
    },

    #[error("Operation '{operation}' could not authenticate: {source}")]
    Authentication {
        operation: String,
        #[source]
        source: AuthError,
    },

    #[error("Operation '{operation}' exceeded its deadline")]
    TimedOut { operation: String },

    #[error("Operation '{operation}' was cancelled")]
    Cancelled { operation: String },
}

impl OperationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OperationError::Failed { kind, .. } => *kind,
            OperationError::Authentication { .. } => ErrorKind::Fatal,
            OperationError::TimedOut { .. } => ErrorKind::Transient,
            OperationError::Cancelled { .. } => ErrorKind::Fatal,
        }
    }

    pub fn operation(&self) -> &str {
        match self {
            OperationError::Failed { operation, .. }
            | OperationError::Authentication { operation, .. }
            | OperationError::TimedOut { operation }
            | OperationError::Cancelled { operation } => operation,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            OperationError::Failed { status, .. } => *status,
            OperationError::Authentication { source, .. } => source.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
