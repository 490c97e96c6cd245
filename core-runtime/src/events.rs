//! # Event Bus System
//!
//! Lifecycle notifications for the gateway core, published over
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: `AuthEvent` for the token lifecycle, `OperationEvent`
//!   for retries, re-authentication and terminal failures
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Receiver wrapper with optional filtering
//!
//! Payloads carry metadata only (tenant, operation name, error kind, HTTP
//! status). Tokens, secrets and response bodies are never placed on the bus.
//!
//! ```text
//! ┌───────────────┐    emit     ┌──────────┐   subscribe   ┌────────────┐
//! │ Authenticator ├────────────>│          ├──────────────>│ Subscriber │
//! └───────────────┘             │ EventBus │               └────────────┘
//! ┌───────────────┐    emit     │          │   subscribe   ┌────────────┐
//! │   Executor    ├────────────>│          ├──────────────>│ Subscriber │
//! └───────────────┘             └──────────┘               └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Auth(AuthEvent::TokenRefreshing {
//!         tenant_id: "acme".to_string(),
//!     }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.description(), "Refreshing access token");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events and can keep
//!   receiving.
//! - **`RecvError::Closed`**: every sender is gone; treat it as shutdown.
//!
//! Emitting with no subscribers returns an error. Publishers in this workspace
//! ignore it (`let _ = bus.emit(..)`).

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the [`EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Token lifecycle events
    Auth(AuthEvent),
    /// Operation executor events
    Operation(OperationEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Operation(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Operation(OperationEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Operation(OperationEvent::Retrying { .. }) => EventSeverity::Warning,
            CoreEvent::Operation(OperationEvent::ReauthRequired { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::TokenRefreshed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

/// Events emitted by the authenticator around the token exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// A token exchange has started.
    TokenRefreshing {
        /// Tenant whose identity endpoint is being called.
        tenant_id: String,
    },
    /// A new token was installed in the cache.
    TokenRefreshed {
        tenant_id: String,
        /// Expiry of the new token (Unix epoch seconds).
        expires_at: i64,
    },
    /// The token exchange failed.
    AuthError {
        tenant_id: String,
        /// Error kind of the failed exchange (e.g. "Transient", "Unauthorized").
        kind: String,
        /// Sanitized message; never includes credentials or response bodies.
        message: String,
        /// Whether a later attempt may succeed.
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::TokenRefreshing { .. } => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Access token refreshed",
            AuthEvent::AuthError { .. } => "Token exchange failed",
        }
    }
}

// ============================================================================
// Operation Events
// ============================================================================

/// Events emitted by the operation executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum OperationEvent {
    /// A retryable failure occurred and the executor is backing off.
    Retrying {
        operation: String,
        /// Retry number, starting at 1.
        attempt: u32,
        /// Backoff before the next attempt, in milliseconds.
        delay_ms: u64,
        kind: String,
        status: Option<u16>,
    },
    /// The operation was rejected with 401; the cached token is being replaced.
    ReauthRequired { operation: String },
    /// The operation ended with a terminal error.
    Failed {
        operation: String,
        kind: String,
        status: Option<u16>,
    },
}

impl OperationEvent {
    fn description(&self) -> &str {
        match self {
            OperationEvent::Retrying { .. } => "Retrying operation",
            OperationEvent::ReauthRequired { .. } => "Re-authenticating operation",
            OperationEvent::Failed { .. } => "Operation failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
///
/// Cloning the bus shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls more than `capacity` events behind receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let failures = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Operation(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refreshed(expires_at: i64) -> CoreEvent {
        CoreEvent::Auth(AuthEvent::TokenRefreshed {
            tenant_id: "acme".to_string(),
            expires_at,
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.emit(refreshed(1)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = CoreEvent::Operation(OperationEvent::ReauthRequired {
            operation: "list_accounts".to_string(),
        });

        assert_eq!(bus.emit(event.clone()).unwrap(), 2);
        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Operation(_)));

        bus.emit(refreshed(1)).ok();
        let failed = CoreEvent::Operation(OperationEvent::Failed {
            operation: "get_safe".to_string(),
            kind: "NotFound".to_string(),
            status: Some(404),
        });
        bus.emit(failed.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), failed);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(refreshed(1_700_000_000 + i)).ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let error_event = CoreEvent::Auth(AuthEvent::AuthError {
            tenant_id: "acme".to_string(),
            kind: "Transient".to_string(),
            message: "token endpoint unreachable".to_string(),
            recoverable: true,
        });
        assert_eq!(error_event.severity(), EventSeverity::Error);

        let retry_event = CoreEvent::Operation(OperationEvent::Retrying {
            operation: "list_accounts".to_string(),
            attempt: 1,
            delay_ms: 500,
            kind: "RateLimited".to_string(),
            status: Some(429),
        });
        assert_eq!(retry_event.severity(), EventSeverity::Warning);

        assert_eq!(refreshed(1).severity(), EventSeverity::Info);

        let refreshing = CoreEvent::Auth(AuthEvent::TokenRefreshing {
            tenant_id: "acme".to_string(),
        });
        assert_eq!(refreshing.severity(), EventSeverity::Debug);
        assert_eq!(refreshing.description(), "Refreshing access token");
    }

    #[test]
    fn test_event_serialization() {
        let event = refreshed(1_700_000_000);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "Auth");
        assert_eq!(json["payload"]["event"], "TokenRefreshed");
        assert_eq!(json["payload"]["expires_at"], 1_700_000_000_i64);

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
