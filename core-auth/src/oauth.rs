//! OAuth 2.0 Client Credentials Exchange
//!
//! Implements the `client_credentials` grant (RFC 6749 section 4.4) against
//! the tenant's identity service.
//!
//! # Security
//!
//! - The client secret only ever leaves the process inside the form body
//! - Token values are never logged
//! - Error responses are reduced to their OAuth `error` code; bodies are
//!   never logged or propagated
//!
//! Exactly one HTTP request is made per call. Retrying is the executor's job.

use crate::classifier::{classify, ErrorKind};
use crate::error::{AuthError, Result};
use crate::types::{
    AccessToken, Credentials, DEFAULT_TOKEN_LIFETIME_SECS, MAX_TOKEN_LIFETIME_SECS,
    TOKEN_SAFETY_MARGIN_SECS,
};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::time::Clock;
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Performs the client-credentials token exchange.
pub struct ClientCredentialsExchange {
    credentials: Credentials,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
}

impl ClientCredentialsExchange {
    pub fn new(
        credentials: Credentials,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            http_client,
            clock,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Exchange the client credentials for a new access token.
    ///
    /// # Errors
    ///
    /// - `AuthenticationFailed` with a classified `cause` for transport
    ///   failures, timeouts and non-2xx responses
    /// - `InvalidTokenResponse` if a 2xx body lacks a usable token
    #[instrument(skip(self), fields(tenant_id = %self.credentials.tenant_id))]
    pub async fn exchange(&self) -> Result<AccessToken> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.expose()),
        ];

        let request = HttpRequest::new(HttpMethod::Post, self.credentials.token_url())
            .header("Accept", "application/json")
            .timeout(self.credentials.timeout)
            .form(&params[..])
            .map_err(|e| AuthError::AuthenticationFailed {
                cause: ErrorKind::Fatal,
                status: None,
                reason: format!("Failed to encode token request: {}", e),
                retry_after: None,
            })?;

        debug!("Requesting access token");

        let response = match timeout(self.credentials.timeout, self.http_client.execute(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(error = %e, "Token endpoint unreachable");
                return Err(AuthError::AuthenticationFailed {
                    cause: classify(None, e.is_transport()),
                    status: None,
                    reason: format!("Token request failed: {}", e),
                    retry_after: None,
                });
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.credentials.timeout.as_secs(),
                    "Token request timed out"
                );
                return Err(AuthError::AuthenticationFailed {
                    cause: ErrorKind::Transient,
                    status: None,
                    reason: "Token request timed out".to_string(),
                    retry_after: None,
                });
            }
        };

        if !response.is_success() {
            return Err(rejection(&response));
        }

        let token_response: TokenResponse = response
            .json()
            .map_err(|_| AuthError::InvalidTokenResponse("body is not a token response".to_string()))?;

        if token_response.access_token.trim().is_empty() {
            return Err(AuthError::InvalidTokenResponse(
                "access_token is empty".to_string(),
            ));
        }

        if let Some(ref token_type) = token_response.token_type {
            if !token_type.eq_ignore_ascii_case("bearer") {
                return Err(AuthError::InvalidTokenResponse(format!(
                    "unsupported token_type '{}'",
                    token_type
                )));
            }
        }

        let expires_in = token_response
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        // A lifetime inside the safety margin yields a token that is stale on arrival.
        if expires_in <= TOKEN_SAFETY_MARGIN_SECS || expires_in > MAX_TOKEN_LIFETIME_SECS {
            return Err(AuthError::InvalidTokenResponse(format!(
                "expires_in must be in {}..={} seconds, got {}",
                TOKEN_SAFETY_MARGIN_SECS + 1,
                MAX_TOKEN_LIFETIME_SECS,
                expires_in
            )));
        }

        debug!(expires_in = expires_in, "Access token issued");

        AccessToken::from_expires_in(token_response.access_token, expires_in, self.clock.now())
            .ok_or_else(|| {
                AuthError::InvalidTokenResponse(format!(
                    "expires_in {} overflows the token expiry",
                    expires_in
                ))
            })
    }
}

/// Turns a non-2xx token response into an error carrying only the status and
/// the OAuth `error` code.
fn rejection(response: &HttpResponse) -> AuthError {
    let status = response.status;
    let error_code = response
        .json::<ErrorResponse>()
        .ok()
        .and_then(|body| body.error)
        .filter(|code| is_error_code(code));

    let cause = classify(Some(status), false);

    warn!(
        status = status,
        error_code = error_code.as_deref().unwrap_or("none"),
        cause = %cause,
        "Token endpoint rejected the exchange"
    );

    let reason = match error_code {
        Some(code) => format!("token endpoint returned {} ({})", status, code),
        None => format!("token endpoint returned {}", status),
    };

    AuthError::AuthenticationFailed {
        cause,
        status: Some(status),
        reason,
        retry_after: response.retry_after(),
    }
}

// RFC 6749 error codes are short ASCII tokens; anything else is not echoed.
fn is_error_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= 64
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Token response from the identity endpoint.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
}
