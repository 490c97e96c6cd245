//! # Host Bridge Traits
//!
//! Capability contracts that the core requires from its host.
//!
//! ## Overview
//!
//! This crate defines the seam between the token manager / operation executor
//! and whatever actually talks to the network. The core never depends on a
//! concrete HTTP stack: hosts inject an [`HttpClient`](http::HttpClient)
//! (desktop builds get `bridge-desktop`'s reqwest adapter) and, optionally, a
//! [`Clock`](time::Clock) for deterministic expiry handling.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP request execution
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Report failures that produced no HTTP response through the transport
//!   variants (`Timeout`, `ConnectionFailed`, `Transport`)
//! - Return non-2xx responses as ordinary `HttpResponse` values
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks.
//!
//! ## Examples
//!
//! ### Implementing HttpClient
//!
//! ```ignore
//! use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyHttpClient {
//!     client: reqwest::Client,
//! }
//!
//! #[async_trait]
//! impl HttpClient for MyHttpClient {
//!     async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
//!         // Implementation
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod http;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use time::{Clock, LogLevel, ManualClock, SystemClock};
