//! Remote Enricher seam
//!
//! The coordinator talks to remote lyrics/cover sources only through
//! [`RemoteEnricher`]. Implementations never fail: timeouts, HTTP errors and
//! empty answers all come back as [`FieldOutcome::Unavailable`] for the
//! requested fields.
//!
//! [`FieldOutcome::Unavailable`]: crate::models::FieldOutcome::Unavailable

use async_trait::async_trait;
use core_library::TrackDescriptor;

use crate::models::{FieldSet, RemoteFetchResult};

#[async_trait]
pub trait RemoteEnricher: Send + Sync {
    /// Fetch the `needed` fields for `descriptor`.
    ///
    /// Fields outside `needed` are reported as `NotRequested`. The coordinator
    /// guarantees at most one call per track identity at a time.
    async fn fetch_remote(&self, descriptor: &TrackDescriptor, needed: FieldSet)
        -> RemoteFetchResult;
}
