//! # Authentication & Operation Execution
//!
//! OAuth 2.0 client-credentials token management and the retry wrapper every
//! outbound API call goes through.
//!
//! ## Overview
//!
//! - [`Authenticator`] keeps one access token per service user and refreshes
//!   it with a single shared exchange, however many tasks ask at once
//! - [`classify`] maps a failed call onto the closed [`ErrorKind`] set
//! - [`OperationExecutor`] runs an operation with a valid token, re-authenticates
//!   once on 401 and backs off on transient failures
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::{Authenticator, Credentials, OperationExecutor, OperationFailure, RetryPolicy};
//! use std::sync::Arc;
//!
//! let credentials = Credentials::new("acme", "svc-gateway@acme", secret);
//! let authenticator = Authenticator::with_defaults(credentials, http_client.clone());
//! let executor = OperationExecutor::new(authenticator);
//!
//! let accounts = executor
//!     .run(
//!         "list_accounts",
//!         |token| {
//!             let http_client = http_client.clone();
//!             async move {
//!                 let response = http_client
//!                     .execute(list_accounts_request().authorization(token.authorization_header()))
//!                     .await?;
//!                 if !response.is_success() {
//!                     return Err(OperationFailure::from_response(&response));
//!                 }
//!                 Ok(response)
//!             }
//!         },
//!         &RetryPolicy::default(),
//!     )
//!     .await?;
//! ```

pub mod authenticator;
pub mod classifier;
pub mod error;
pub mod executor;
pub mod oauth;
pub mod types;

pub use authenticator::Authenticator;
pub use classifier::{classify, ErrorKind};
pub use error::{AuthError, OperationError, Result};
pub use executor::{OperationExecutor, OperationFailure, RetryPolicy};
pub use oauth::ClientCredentialsExchange;
pub use types::{
    AccessToken, Credentials, TokenCache, MAX_TOKEN_LIFETIME_SECS, TOKEN_SAFETY_MARGIN_SECS,
};
