//! # Core Configuration Module
//!
//! Provides configuration management for the gateway core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the service credentials, transport limits and the
//! injected bridges. It enforces fail-fast validation so a misconfigured
//! process stops at startup instead of at its first API call.
//!
//! ## Required Values
//!
//! - Tenant identifier (selects the identity endpoint)
//! - OAuth client id and client secret
//!
//! ## Optional Values (with defaults)
//!
//! - Request timeout (default 30s)
//! - Maximum retries for transient failures (default 3)
//! - Identity base URL override (default `https://{tenant}.id.cyberark.cloud`)
//! - `HttpClient` bridge (desktop default: reqwest, via `desktop-shims`)
//! - `Clock` bridge (default: system clock)
//!
//! ## Usage
//!
//! ### From the environment
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::from_env()?.build()?;
//! ```
//!
//! ### Explicit construction
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .tenant_id("acme")
//!     .client_id("svc-gateway@acme")
//!     .client_secret("...")
//!     .max_retries(5)
//!     .http_client(Arc::new(MyHttpClient))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::secret::SecretString;
use bridge_traits::{Clock, HttpClient, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Environment variable holding the OAuth client id.
pub const ENV_CLIENT_ID: &str = "CYBERARK_CLIENT_ID";
/// Environment variable holding the OAuth client secret.
pub const ENV_CLIENT_SECRET: &str = "CYBERARK_CLIENT_SECRET";
/// Environment variable holding the tenant identifier.
pub const ENV_TENANT_ID: &str = "CYBERARK_TENANT_ID";
/// Legacy name for [`ENV_TENANT_ID`].
pub const ENV_SUBDOMAIN: &str = "CYBERARK_SUBDOMAIN";
/// Environment variable overriding the request timeout, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "CYBERARK_TIMEOUT_SECS";
/// Environment variable overriding the transient retry budget.
pub const ENV_MAX_RETRIES: &str = "CYBERARK_MAX_RETRIES";
/// Environment variable overriding the identity base URL.
pub const ENV_IDENTITY_URL: &str = "CYBERARK_IDENTITY_URL";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const MAX_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_RETRIES_LIMIT: u32 = 10;

/// Core configuration for the gateway core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Tenant identifier used to derive the identity endpoint
    pub tenant_id: String,

    /// OAuth client id of the service user
    pub client_id: String,

    /// OAuth client secret of the service user
    pub client_secret: SecretString,

    /// Identity base URL override (scheme + host, no path)
    pub identity_url: Option<String>,

    /// Timeout applied to each outbound request
    pub timeout: Duration,

    /// Retry budget for transient and rate-limited failures
    pub max_retries: u32,

    /// HTTP client used for the token exchange and API calls
    pub http_client: Arc<dyn HttpClient>,

    /// Time source for token expiry checks
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret)
            .field("identity_url", &self.identity_url)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("http_client", &"HttpClient { ... }")
            .field("clock", &"Clock { ... }")
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Creates a builder pre-populated from the process environment.
    ///
    /// Bridges can still be injected on the returned builder before calling
    /// [`build()`](CoreConfigBuilder::build).
    ///
    /// # Errors
    ///
    /// - `Error::MissingEnv` if a required variable is unset or blank
    /// - `Error::Config` if a numeric override does not parse
    pub fn from_env() -> Result<CoreConfigBuilder> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through
    /// `lookup`, so callers (and tests) can supply their own source.
    pub fn from_lookup<F>(lookup: F) -> Result<CoreConfigBuilder>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let client_id = read(ENV_CLIENT_ID).ok_or_else(|| Error::MissingEnv(ENV_CLIENT_ID.into()))?;
        let client_secret =
            read(ENV_CLIENT_SECRET).ok_or_else(|| Error::MissingEnv(ENV_CLIENT_SECRET.into()))?;
        let tenant_id = read(ENV_TENANT_ID)
            .or_else(|| read(ENV_SUBDOMAIN))
            .ok_or_else(|| Error::MissingEnv(ENV_TENANT_ID.into()))?;

        let mut builder = CoreConfigBuilder::default()
            .tenant_id(tenant_id)
            .client_id(client_id)
            .client_secret(client_secret);

        if let Some(raw) = read(ENV_TIMEOUT_SECS) {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!("{} must be a whole number of seconds", ENV_TIMEOUT_SECS))
            })?;
            builder = builder.timeout(Duration::from_secs(secs));
        }

        if let Some(raw) = read(ENV_MAX_RETRIES) {
            let retries = raw.trim().parse::<u32>().map_err(|_| {
                Error::Config(format!("{} must be a non-negative integer", ENV_MAX_RETRIES))
            })?;
            builder = builder.max_retries(retries);
        }

        if let Some(url) = read(ENV_IDENTITY_URL) {
            builder = builder.identity_url(url);
        }

        Ok(builder)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Tenant, client id and client secret are not blank
    /// - The tenant identifier is a plain DNS label
    /// - Timeout is within (0, 300s]
    /// - Retry budget does not exceed 10
    /// - The identity URL override, if any, is an absolute http(s) URL
    pub fn validate(&self) -> Result<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(Error::Config("Tenant id cannot be empty".to_string()));
        }

        if !self
            .tenant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(Error::Config(
                "Tenant id may only contain letters, digits and '-'".to_string(),
            ));
        }

        if self.client_id.trim().is_empty() {
            return Err(Error::Config("Client id cannot be empty".to_string()));
        }

        if self.client_secret.is_empty() {
            return Err(Error::Config("Client secret cannot be empty".to_string()));
        }

        if self.timeout.is_zero() {
            return Err(Error::Config(
                "Timeout must be greater than 0 seconds".to_string(),
            ));
        }

        if self.timeout > MAX_TIMEOUT {
            return Err(Error::Config(
                "Timeout exceeds maximum of 300 seconds".to_string(),
            ));
        }

        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(Error::Config(format!(
                "Max retries exceeds maximum of {}",
                MAX_RETRIES_LIMIT
            )));
        }

        if let Some(ref raw) = self.identity_url {
            let url = Url::parse(raw)
                .map_err(|e| Error::Config(format!("Invalid identity URL: {}", e)))?;
            if !matches!(url.scheme(), "https" | "http") {
                return Err(Error::Config(
                    "Identity URL must use http or https".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for the token exchange and API calls. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestHttpClient. \
                 Other hosts: inject a platform-native adapter with .http_client()."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout)
        .map_err(|e| Error::Internal(format!("Failed to initialize default HttpClient: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    identity_url: Option<String>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    http_client: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the tenant identifier.
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Sets the OAuth client id.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the OAuth client secret.
    pub fn client_secret(mut self, secret: impl Into<SecretString>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Overrides the identity base URL (e.g. for a staging tenant or a test server).
    pub fn identity_url(mut self, url: impl Into<String>) -> Self {
        self.identity_url = Some(url.into());
        self
    }

    /// Sets the per-request timeout.
    ///
    /// Default: 30 seconds
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry budget for transient and rate-limited failures.
    ///
    /// Default: 3
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Injects the HTTP client bridge.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Injects the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A required value (tenant, client id, client secret) is missing
    /// - No `HttpClient` is injected and `desktop-shims` is disabled
    /// - Any value fails [`CoreConfig::validate`]
    pub fn build(self) -> Result<CoreConfig> {
        let tenant_id = self.tenant_id.ok_or_else(|| {
            Error::Config("Tenant id is required. Use .tenant_id() to set it.".to_string())
        })?;

        let client_id = self.client_id.ok_or_else(|| {
            Error::Config("Client id is required. Use .client_id() to set it.".to_string())
        })?;

        let client_secret = self.client_secret.ok_or_else(|| {
            Error::Config("Client secret is required. Use .client_secret() to set it.".to_string())
        })?;

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(timeout)?,
        };

        let config = CoreConfig {
            tenant_id,
            client_id,
            client_secret,
            identity_url: self.identity_url,
            timeout,
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            http_client,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
