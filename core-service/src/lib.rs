//! # Core Service
//!
//! Facade that wires configuration, the token authenticator and the
//! operation executor into one handle a host application can hold.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//! use bridge_traits::http::{HttpMethod, HttpRequest};
//!
//! let service = CoreService::from_env()?;
//! let request = HttpRequest::new(
//!     HttpMethod::Get,
//!     "https://acme.privilegecloud.cyberark.cloud/PasswordVault/API/Accounts",
//! );
//! let response = service.send("list_accounts", request).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_auth::{AccessToken, Authenticator, OperationExecutor, OperationFailure, RetryPolicy};
use core_runtime::config::{CoreConfig, CoreConfigBuilder};
use core_runtime::events::{EventBus, EventStream};
use core_runtime::logging::redact_if_sensitive;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Entry point of the gateway core.
///
/// Cheap to clone; clones share the token cache and event bus.
#[derive(Clone)]
pub struct CoreService {
    authenticator: Authenticator,
    executor: OperationExecutor,
    event_bus: EventBus,
    http_client: Arc<dyn HttpClient>,
    retry_policy: RetryPolicy,
}

impl CoreService {
    pub fn new(config: CoreConfig) -> Self {
        let event_bus = EventBus::default();
        let authenticator = Authenticator::from_config(&config, Some(event_bus.clone()));
        let executor =
            OperationExecutor::new(authenticator.clone()).with_event_bus(event_bus.clone());

        info!(
            tenant_id = %config.tenant_id,
            max_retries = config.max_retries,
            "Core service initialized"
        );

        Self {
            authenticator,
            executor,
            event_bus,
            http_client: config.http_client.clone(),
            retry_policy: RetryPolicy::new(config.max_retries),
        }
    }

    /// Builds the configuration from `builder` and initializes the service.
    pub fn from_builder(builder: CoreConfigBuilder) -> Result<Self> {
        let config = builder.build()?;
        Ok(Self::new(config))
    }

    /// Initializes the service from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_builder(CoreConfig::from_env()?)
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn executor(&self) -> &OperationExecutor {
        &self.executor
    }

    pub fn events(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Policy used by [`run`](Self::run) and [`send`](Self::send).
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Returns a valid bearer token, refreshing it if needed.
    pub async fn get_valid_token(&self) -> Result<AccessToken> {
        Ok(self.authenticator.get_valid_token().await?)
    }

    pub async fn run<T, F, Fut>(&self, name: &str, operation: F) -> Result<T>
    where
        F: FnMut(AccessToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, OperationFailure>>,
    {
        self.run_with_policy(name, operation, &self.retry_policy)
            .await
    }

    pub async fn run_with_policy<T, F, Fut>(
        &self,
        name: &str,
        operation: F,
        policy: &RetryPolicy,
    ) -> Result<T>
    where
        F: FnMut(AccessToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, OperationFailure>>,
    {
        Ok(self.executor.run(name, operation, policy).await?)
    }

    pub async fn run_with_cancellation<T, F, Fut>(
        &self,
        name: &str,
        operation: F,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        F: FnMut(AccessToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, OperationFailure>>,
    {
        Ok(self
            .executor
            .run_with_cancellation(name, operation, &self.retry_policy, cancel)
            .await?)
    }

    /// Sends `request` with a bearer token through the executor.
    ///
    /// Any existing `Authorization` header is replaced on every attempt.
    /// Non-2xx responses become classified failures; the response body is
    /// never part of the error.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Operation` once retries and re-authentication are
    /// exhausted.
    pub async fn send(&self, name: &str, mut request: HttpRequest) -> Result<HttpResponse> {
        let client = self.http_client.clone();
        request
            .headers
            .retain(|key, _| !key.eq_ignore_ascii_case("authorization"));

        self.run(name, |token: AccessToken| {
            let client = client.clone();
            let request = request.clone().authorization(token.authorization_header());
            async move {
                log_request(&request);

                let response = client
                    .execute(request)
                    .await
                    .map_err(OperationFailure::from)?;

                if response.is_success() {
                    Ok(response)
                } else {
                    Err(OperationFailure::from_response(&response))
                }
            }
        })
        .await
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("authenticator", &self.authenticator)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

fn log_request(request: &HttpRequest) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }

    let mut headers: Vec<String> = request
        .headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, redact_if_sensitive(name, value)))
        .collect();
    headers.sort_unstable();

    debug!(
        method = ?request.method,
        url = %request.url,
        headers = ?headers,
        "Sending authorized request"
    );
}
