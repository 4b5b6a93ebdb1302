//! Workspace umbrella crate.
//!
//! Re-exports [`core_service`] so host applications can depend on a single
//! crate and pick bridge defaults through the `desktop-shims` feature.

pub use core_service::*;
