//! Workspace entry crate.
//!
//! Exposes the feature flags that map onto the workspace crates (chiefly
//! `core-service`). Host applications can depend on `pam-gateway-workspace`
//! and get the gateway core with the desktop HTTP bridge without wiring each
//! crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::{CoreError, CoreService};
