//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the gateway core:
//! - Configuration management (`CoreConfig` builder and environment loading)
//! - Logging and tracing setup
//! - Lifecycle event bus
//! - Secret handling
//!
//! ## Overview
//!
//! Every other core crate depends on this one for its configuration surface,
//! its logging conventions and the broadcast channel used to report token and
//! operation lifecycle events to the host.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod secret;

pub use error::{Error, Result};
pub use secret::SecretString;
