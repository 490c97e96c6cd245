//! Failure classification.
//!
//! Maps the outcome of a failed call (HTTP status and/or transport failure)
//! onto the closed [`ErrorKind`] set the executor reasons about. Bodies are
//! never inspected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What went wrong with one attempt, as far as retry decisions go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// 401: the token was rejected
    Unauthorized,
    /// 403: the caller lacks permission
    Forbidden,
    /// 404: the resource does not exist
    NotFound,
    /// 429: the server asked us to slow down
    RateLimited,
    /// Network failure, timeout or 5xx
    Transient,
    /// Anything else: malformed request, unexpected 4xx, programmer error
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::Transient => "Transient",
            ErrorKind::Fatal => "Fatal",
        }
    }

    /// `true` for kinds that are recovered by backing off and trying again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::RateLimited)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a failed call.
///
/// A response status always wins over the transport flag. Without a status,
/// a transport failure is `Transient` and anything else is `Fatal`.
pub fn classify(status: Option<u16>, transport_error: bool) -> ErrorKind {
    match status {
        Some(401) => ErrorKind::Unauthorized,
        Some(403) => ErrorKind::Forbidden,
        Some(404) => ErrorKind::NotFound,
        Some(429) => ErrorKind::RateLimited,
        Some(500..=599) => ErrorKind::Transient,
        Some(_) => ErrorKind::Fatal,
        None if transport_error => ErrorKind::Transient,
        None => ErrorKind::Fatal,
    }
}
