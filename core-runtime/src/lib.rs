//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the library and enrichment crates:
//! - Logging and tracing setup
//! - Configuration builder and environment loading
//! - Event bus for library and enrichment notifications

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, EnrichmentSettings, RemoteApiConfig};
pub use error::{Error, Result};
