//! # Host Bridge Traits
//!
//! Capability contracts between the enrichment core and the host it runs in.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP used by remote metadata providers
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Library walking and cache persistence
//! - [`Clock`](time::Clock) - Time source for cooldowns and rate limits
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability is
//! missing:
//!
//! ```ignore
//! let http_client = config.http_client.ok_or_else(|| Error::CapabilityMissing {
//!     capability: "HttpClient".to_string(),
//!     message: "Enable the desktop-shims feature or inject an adapter.".to_string(),
//! })?;
//! ```
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across worker tasks behind `Arc`.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
