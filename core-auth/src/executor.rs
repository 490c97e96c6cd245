//! # Operation Executor
//!
//! Wraps every outbound API call with token acquisition, classification and
//! recovery:
//!
//! ```text
//! Init ─► Authenticated ─► Executing ─┬─► Success
//!              ▲                      ├─► Retryable ──(backoff)──► Executing
//!              └──── ReauthOnce ◄─────┤   (Transient / RateLimited, bounded)
//!                    (401, max 1)     └─► Terminal
//! ```
//!
//! - `Unauthorized`: the cached token is invalidated and a fresh one fetched,
//!   once per call. A second 401 is terminal and reported as `Fatal`.
//! - `Transient` / `RateLimited`: exponential backoff (capped, jittered) up to
//!   `max_retries` times, reusing the same token. `Retry-After` on a 429
//!   stretches the wait.
//! - `Forbidden` / `NotFound` / `Fatal`: returned immediately.
//!
//! A deadline on the policy or a [`CancellationToken`] aborts the current
//! attempt or backoff sleep. Neither aborts a token refresh shared with
//! other callers.

use crate::authenticator::Authenticator;
use crate::classifier::{classify, ErrorKind};
use crate::error::{AuthError, OperationError};
use crate::types::AccessToken;
use bridge_traits::error::BridgeError;
use bridge_traits::http::HttpResponse;
use core_runtime::events::{CoreEvent, EventBus, OperationEvent};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

pub type Result<T> = std::result::Result<T, OperationError>;

/// Retry behaviour for a single `run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed for transient and rate-limited failures
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry
    pub base_delay: Duration,
    /// Upper bound for any single wait, `Retry-After` included
    pub max_delay: Duration,
    /// Randomize each delay within `[delay / 2, delay]`
    pub jitter: bool,
    /// Bound on the whole `run`, retries and waits included
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Never retries transient failures. Re-authentication still happens.
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Backoff before retry number `retry` (starting at 1).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let millis = delay.as_millis() as u64;
        let half = millis / 2;
        Duration::from_millis(rand::thread_rng().gen_range(half..=millis))
    }

    /// Wait before retry number `retry`, honouring a server-provided
    /// `Retry-After` up to `max_delay`.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff_delay(retry);
        match retry_after {
            Some(hint) => backoff.max(hint).min(self.max_delay),
            None => backoff,
        }
    }
}

/// Failed attempt reported by an operation.
///
/// Carries only what classification needs plus a short message. Never put a
/// response body or credential in `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailure {
    pub status: Option<u16>,
    pub transport_error: bool,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl OperationFailure {
    /// The call reached the server and got a non-2xx status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            transport_error: false,
            message: message.into(),
            retry_after: None,
        }
    }

    /// The call never produced a response.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            transport_error: true,
            message: message.into(),
            retry_after: None,
        }
    }

    /// The operation itself is broken (bad input, unparsable response, ...).
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            status: None,
            transport_error: false,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Builds a failure from a non-2xx response, keeping `Retry-After`.
    pub fn from_response(response: &HttpResponse) -> Self {
        Self {
            status: Some(response.status),
            transport_error: false,
            message: format!("HTTP {}", response.status),
            retry_after: response.retry_after(),
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        classify(self.status, self.transport_error)
    }
}

impl From<BridgeError> for OperationFailure {
    fn from(error: BridgeError) -> Self {
        if error.is_transport() {
            Self::transport(error.to_string())
        } else {
            Self::fatal(error.to_string())
        }
    }
}

/// Runs operations with a valid token and the recovery rules above.
#[derive(Clone)]
pub struct OperationExecutor {
    authenticator: Authenticator,
    event_bus: Option<EventBus>,
}

impl OperationExecutor {
    pub fn new(authenticator: Authenticator) -> Self {
        Self {
            authenticator,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Runs `operation` with a valid token, retrying per `policy`.
    ///
    /// `operation` may be invoked several times; each invocation receives
    /// the token to use for that attempt.
    ///
    /// # Errors
    ///
    /// - `Failed` for terminal classified failures
    /// - `Authentication` if no token could be obtained
    /// - `TimedOut` if `policy.deadline` elapsed first
    #[instrument(skip(self, operation, policy), fields(max_retries = policy.max_retries))]
    pub async fn run<T, F, Fut>(&self, name: &str, operation: F, policy: &RetryPolicy) -> Result<T>
    where
        F: FnMut(AccessToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, OperationFailure>>,
    {
        self.run_bounded(name, operation, policy).await
    }

    /// Like [`run`](Self::run), but gives up with `Cancelled` as soon as
    /// `cancel` fires.
    #[instrument(skip(self, operation, policy, cancel), fields(max_retries = policy.max_retries))]
    pub async fn run_with_cancellation<T, F, Fut>(
        &self,
        name: &str,
        operation: F,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        F: FnMut(AccessToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, OperationFailure>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(operation = name, "Operation cancelled");
                self.emit_failed(name, ErrorKind::Fatal, None);
                Err(OperationError::Cancelled {
                    operation: name.to_string(),
                })
            }
            result = self.run_bounded(name, operation, policy) => result,
        }
    }

    async fn run_bounded<T, F, Fut>(&self, name: &str, operation: F, policy: &RetryPolicy) -> Result<T>
    where
        F: FnMut(AccessToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, OperationFailure>>,
    {
        let attempts = self.execute_attempts(name, operation, policy);

        let Some(deadline) = policy.deadline else {
            return attempts.await;
        };

        match timeout(deadline, attempts).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation = name,
                    deadline_ms = deadline.as_millis() as u64,
                    "Operation deadline exceeded"
                );
                self.emit_failed(name, ErrorKind::Transient, None);
                Err(OperationError::TimedOut {
                    operation: name.to_string(),
                })
            }
        }
    }

    async fn execute_attempts<T, F, Fut>(
        &self,
        name: &str,
        mut operation: F,
        policy: &RetryPolicy,
    ) -> Result<T>
    where
        F: FnMut(AccessToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, OperationFailure>>,
    {
        let mut retries = 0u32;
        let mut reauthenticated = false;
        let mut token = self.acquire_token(name, policy, &mut retries).await?;

        loop {
            let failure = match operation(token.clone()).await {
                Ok(value) => {
                    if retries > 0 || reauthenticated {
                        debug!(operation = name, retries, reauthenticated, "Operation recovered");
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            match failure.kind() {
                ErrorKind::Unauthorized if !reauthenticated => {
                    reauthenticated = true;
                    warn!(operation = name, "Token rejected, re-authenticating");
                    self.emit(OperationEvent::ReauthRequired {
                        operation: name.to_string(),
                    });

                    self.authenticator.invalidate(&token).await;
                    token = self.acquire_token(name, policy, &mut retries).await?;
                }
                ErrorKind::Unauthorized => {
                    return Err(self.terminal(name, ErrorKind::Fatal, failure));
                }
                kind if kind.is_retryable() && retries < policy.max_retries => {
                    retries += 1;
                    let delay = policy.delay_for(retries, failure.retry_after);
                    warn!(
                        operation = name,
                        kind = %kind,
                        status = ?failure.status,
                        retry = retries,
                        max_retries = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Operation failed, retrying"
                    );
                    self.emit(OperationEvent::Retrying {
                        operation: name.to_string(),
                        attempt: retries,
                        delay_ms: delay.as_millis() as u64,
                        kind: kind.to_string(),
                        status: failure.status,
                    });
                    sleep(delay).await;
                }
                kind => {
                    return Err(self.terminal(name, kind, failure));
                }
            }
        }
    }

    /// Fetches a token. Retryable exchange failures consume the same budget
    /// as retryable operation failures.
    async fn acquire_token(
        &self,
        name: &str,
        policy: &RetryPolicy,
        retries: &mut u32,
    ) -> Result<AccessToken> {
        loop {
            match self.authenticator.get_valid_token().await {
                Ok(token) => return Ok(token),
                Err(e) if e.is_retryable() && *retries < policy.max_retries => {
                    *retries += 1;
                    let delay = policy.delay_for(*retries, e.retry_after());
                    warn!(
                        operation = name,
                        cause = %e.cause(),
                        retry = *retries,
                        delay_ms = delay.as_millis() as u64,
                        "Token refresh failed, retrying"
                    );
                    self.emit(OperationEvent::Retrying {
                        operation: name.to_string(),
                        attempt: *retries,
                        delay_ms: delay.as_millis() as u64,
                        kind: e.cause().to_string(),
                        status: e.status(),
                    });
                    sleep(delay).await;
                }
                Err(e) => return Err(self.authentication_failed(name, e)),
            }
        }
    }

    fn authentication_failed(&self, name: &str, source: AuthError) -> OperationError {
        error!(
            operation = name,
            cause = %source.cause(),
            status = ?source.status(),
            "Operation could not authenticate"
        );
        self.emit_failed(name, ErrorKind::Fatal, source.status());
        OperationError::Authentication {
            operation: name.to_string(),
            source,
        }
    }

    fn terminal(&self, name: &str, kind: ErrorKind, failure: OperationFailure) -> OperationError {
        error!(
            operation = name,
            kind = %kind,
            status = ?failure.status,
            "Operation failed"
        );
        self.emit_failed(name, kind, failure.status);
        OperationError::Failed {
            operation: name.to_string(),
            kind,
            status: failure.status,
            message: failure.message,
        }
    }

    fn emit_failed(&self, name: &str, kind: ErrorKind, status: Option<u16>) {
        self.emit(OperationEvent::Failed {
            operation: name.to_string(),
            kind: kind.to_string(),
            status,
        });
    }

    fn emit(&self, event: OperationEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Operation(event));
        }
    }
}

impl std::fmt::Debug for OperationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationExecutor")
            .field("authenticator", &self.authenticator)
            .finish_non_exhaustive()
    }
}
