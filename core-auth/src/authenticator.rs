//! # Authenticator
//!
//! Owns the token cache and hands out valid access tokens to any number of
//! concurrent callers.
//!
//! ## Refresh coordination
//!
//! ```text
//! get_valid_token()
//!   ├─ read lock: cached token valid? ──────────────► return it
//!   └─ refresh mutex
//!        ├─ cached token valid now? (double check) ─► return it
//!        ├─ refresh in flight? ────────────────────► await shared handle
//!        └─ spawn refresh task, store shared handle ► await shared handle
//! ```
//!
//! The refresh runs as its own task. It installs the new token and clears
//! the in-flight handle whether or not anyone is still waiting, so dropping a
//! caller never cancels a refresh other callers depend on.

use crate::error::{AuthError, Result};
use crate::oauth::ClientCredentialsExchange;
use crate::types::{AccessToken, Credentials, TokenCache};
use bridge_traits::http::HttpClient;
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_runtime::config::CoreConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument};

type RefreshHandle = Shared<BoxFuture<'static, Result<AccessToken>>>;

/// Thread-safe access token provider.
///
/// Cheap to clone; clones share the same cache and refresh state.
#[derive(Clone)]
pub struct Authenticator {
    inner: Arc<Inner>,
}

struct Inner {
    tenant_id: String,
    exchange: ClientCredentialsExchange,
    clock: Arc<dyn Clock>,
    cache: RwLock<TokenCache>,
    /// At most one refresh in flight; also serializes cache writes.
    refresh: Mutex<Option<RefreshHandle>>,
    event_bus: Option<EventBus>,
}

impl Authenticator {
    /// Creates an authenticator with an empty cache.
    ///
    /// # Arguments
    ///
    /// * `credentials` - Client credentials and tenant of the service user
    /// * `http_client` - HTTP bridge used for the token exchange
    /// * `clock` - Time source for expiry checks
    /// * `event_bus` - Optional bus for token lifecycle events
    pub fn new(
        credentials: Credentials,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        event_bus: Option<EventBus>,
    ) -> Self {
        let tenant_id = credentials.tenant_id.clone();
        let exchange = ClientCredentialsExchange::new(credentials, http_client, clock.clone());

        Self {
            inner: Arc::new(Inner {
                tenant_id,
                exchange,
                clock,
                cache: RwLock::new(TokenCache::new()),
                refresh: Mutex::new(None),
                event_bus,
            }),
        }
    }

    /// Creates an authenticator from a validated configuration.
    pub fn from_config(config: &CoreConfig, event_bus: Option<EventBus>) -> Self {
        Self::new(
            Credentials::from_config(config),
            config.http_client.clone(),
            config.clock.clone(),
            event_bus,
        )
    }

    /// Creates an authenticator using the system clock and no event bus.
    pub fn with_defaults(credentials: Credentials, http_client: Arc<dyn HttpClient>) -> Self {
        Self::new(credentials, http_client, Arc::new(SystemClock), None)
    }

    pub fn credentials(&self) -> &Credentials {
        self.inner.exchange.credentials()
    }

    /// Returns a token that is valid for at least the safety margin.
    ///
    /// Concurrent callers that find the cache stale share a single token
    /// exchange and all receive its result.
    ///
    /// # Errors
    ///
    /// Returns the exchange's [`AuthError`] if the refresh fails. The failure
    /// is not cached; the next call starts a new refresh.
    #[instrument(skip(self), fields(tenant_id = %self.inner.tenant_id))]
    pub async fn get_valid_token(&self) -> Result<AccessToken> {
        if let Some(token) = self.inner.cached_valid_token().await {
            return Ok(token);
        }

        let handle = {
            let mut in_flight = self.inner.refresh.lock().await;

            if let Some(token) = self.inner.cached_valid_token().await {
                debug!("Token refreshed by a concurrent caller");
                return Ok(token);
            }

            match in_flight.as_ref() {
                Some(handle) => {
                    debug!("Joining in-flight token refresh");
                    handle.clone()
                }
                None => {
                    let handle = Inner::spawn_refresh(self.inner.clone());
                    *in_flight = Some(handle.clone());
                    handle
                }
            }
        };

        handle.await
    }

    /// Drops `stale` from the cache so the next caller refreshes.
    ///
    /// Has no effect if the cache already holds a different token, which
    /// means another caller refreshed in the meantime. Returns `true` if the
    /// token was removed.
    #[instrument(skip(self, stale), fields(tenant_id = %self.inner.tenant_id))]
    pub async fn invalidate(&self, stale: &AccessToken) -> bool {
        let _in_flight = self.inner.refresh.lock().await;
        let removed = self.inner.cache.write().await.invalidate_if_matches(stale);

        if removed {
            info!("Cached token invalidated");
        } else {
            debug!("Cached token already replaced; nothing to invalidate");
        }
        removed
    }

    /// Drops whatever token is cached.
    pub async fn clear(&self) {
        let _in_flight = self.inner.refresh.lock().await;
        self.inner.cache.write().await.clear();
    }

    /// Hard expiry of the cached token, if any.
    pub async fn token_expiry(&self) -> Option<DateTime<Utc>> {
        self.inner.cache.read().await.expires_at()
    }

    /// Time left before the cached token hard-expires.
    pub async fn time_until_expiry(&self) -> Option<chrono::Duration> {
        let now = self.inner.clock.now();
        self.inner.cache.read().await.time_until_expiry(now)
    }
}

impl Inner {
    async fn cached_valid_token(&self) -> Option<AccessToken> {
        let now = self.clock.now();
        self.cache.read().await.valid_token(now).cloned()
    }

    /// Must be called with the refresh mutex held.
    fn spawn_refresh(inner: Arc<Inner>) -> RefreshHandle {
        let task_inner = inner.clone();
        let task = tokio::spawn(async move { task_inner.refresh_and_install().await });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    // The task died before clearing its own handle.
                    *inner.refresh.lock().await = None;
                    error!(tenant_id = %inner.tenant_id, "Token refresh task aborted");
                    Err(AuthError::RefreshAborted(e.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn refresh_and_install(&self) -> Result<AccessToken> {
        info!(tenant_id = %self.tenant_id, "Refreshing access token");
        self.emit(AuthEvent::TokenRefreshing {
            tenant_id: self.tenant_id.clone(),
        });

        let result = self.exchange.exchange().await;

        let mut in_flight = self.refresh.lock().await;
        if let Ok(ref token) = result {
            self.cache.write().await.install(token.clone());
        }
        *in_flight = None;
        drop(in_flight);

        match &result {
            Ok(token) => {
                info!(
                    tenant_id = %self.tenant_id,
                    expires_at = %token.expires_at,
                    "Access token refreshed"
                );
                self.emit(AuthEvent::TokenRefreshed {
                    tenant_id: self.tenant_id.clone(),
                    expires_at: token.expires_at.timestamp(),
                });
            }
            Err(e) => {
                error!(
                    tenant_id = %self.tenant_id,
                    cause = %e.cause(),
                    status = ?e.status(),
                    "Token refresh failed"
                );
                self.emit(AuthEvent::AuthError {
                    tenant_id: self.tenant_id.clone(),
                    kind: e.cause().to_string(),
                    message: e.to_string(),
                    recoverable: e.is_retryable(),
                });
            }
        }

        result
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Auth(event));
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("tenant_id", &self.inner.tenant_id)
            .finish_non_exhaustive()
    }
}
