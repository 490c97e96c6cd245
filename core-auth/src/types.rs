use chrono::{DateTime, Duration, Utc};
use core_runtime::config::{CoreConfig, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT};
use core_runtime::SecretString;
use std::fmt;

/// A cached token stops being handed out this many seconds before it expires.
pub const TOKEN_SAFETY_MARGIN_SECS: i64 = 60;

/// Lifetime assumed when the identity endpoint omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 900;

/// Longest `expires_in` accepted from the identity endpoint (one year).
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// OAuth client credentials of the service user.
///
/// Immutable once built; the authenticator owns its copy.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: SecretString,
    /// Overrides `https://{tenant_id}.id.cyberark.cloud`
    pub identity_url: Option<String>,
    /// Bound on a single token exchange
    pub timeout: std::time::Duration,
    pub max_retries: u32,
}

impl Credentials {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<SecretString>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            identity_url: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_identity_url(mut self, url: impl Into<String>) -> Self {
        self.identity_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Extracts the credential part of a validated configuration.
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            tenant_id: config.tenant_id.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            identity_url: config.identity_url.clone(),
            timeout: config.timeout,
            max_retries: config.max_retries,
        }
    }

    /// Token endpoint of the tenant's identity service.
    pub fn token_url(&self) -> String {
        match &self.identity_url {
            Some(base) => format!("{}/oauth2/platformtoken", base.trim_end_matches('/')),
            None => format!(
                "https://{}.id.cyberark.cloud/oauth2/platformtoken",
                self.tenant_id
            ),
        }
    }
}

/// Bearer token issued by the identity service.
///
/// Never mutated once issued; a refresh produces a new value. The `Debug`
/// implementation redacts the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Opaque token value sent in the `Authorization` header
    pub access_token: String,
    /// Always "Bearer"
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_at,
        }
    }

    /// Builds a token from an `expires_in` value relative to `now`.
    ///
    /// Returns `None` if the expiry is not representable.
    pub fn from_expires_in(
        access_token: impl Into<String>,
        expires_in: i64,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))?;
        Some(Self::new(access_token, expires_at))
    }

    /// `true` while `now` is before `expires_at` minus the safety margin.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - Duration::seconds(TOKEN_SAFETY_MARGIN_SECS)
    }

    /// Time until hard expiry, or `None` if already expired.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        if now >= self.expires_at {
            None
        } else {
            Some(self.expires_at - now)
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Holder of the current token.
///
/// Pure data: locking and refresh coordination live in the authenticator.
#[derive(Debug, Default)]
pub struct TokenCache {
    current: Option<AccessToken>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached token if it is still valid at `now`.
    pub fn valid_token(&self, now: DateTime<Utc>) -> Option<&AccessToken> {
        self.current.as_ref().filter(|token| token.is_valid_at(now))
    }

    pub fn install(&mut self, token: AccessToken) {
        self.current = Some(token);
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Clears the cache only if it still holds `stale`.
    ///
    /// Returns `true` if the token was removed.
    pub fn invalidate_if_matches(&mut self, stale: &AccessToken) -> bool {
        if self.current.as_ref() == Some(stale) {
            self.current = None;
            true
        } else {
            false
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.current.as_ref().map(|token| token.expires_at)
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.current
            .as_ref()
            .and_then(|token| token.time_until_expiry(now))
    }
}
