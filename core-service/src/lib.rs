//! Core service façade.
//!
//! Wires the host-provided bridges (HTTP, filesystem, clock) carried by
//! [`CoreConfig`](core_runtime::CoreConfig) into the library scanner, the
//! local metadata reader, the enrichment cache and the background
//! coordinator, and exposes them as a single [`CoreService`].
//!
//! ```no_run
//! # async fn run() -> core_service::Result<()> {
//! use core_service::{CoreConfig, CoreService};
//!
//! let config = CoreConfig::builder()
//!     .music_root("/home/me/Music")
//!     .cache_dir("/home/me/.cache/music-core")
//!     .build()?;
//! let service = CoreService::start(config).await?;
//!
//! for track in service.get_descriptors().await? {
//!     let record = service.query_metadata(&track.identity).await?;
//!     println!("{} - {}: {:?}", track.artist, track.title, record.status);
//! }
//!
//! service.close().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod service;

pub use error::{CoreError, Result};
pub use service::{CoreService, CoverLookup, EnrichSummary, LyricsLookup, ScanSummary};

pub use core_library::{TrackDescriptor, TrackIdentity};
pub use core_metadata::{
    CoverImage, CoverRef, EnrichmentRecord, EnsureOutcome, FieldState, RecordSource,
    RecordStatus, RemoteEnricher,
};
pub use core_runtime::events::{CoreEvent, EnrichmentEvent, LibraryEvent};
pub use core_runtime::{CoreConfig, EnrichmentSettings, RemoteApiConfig};
