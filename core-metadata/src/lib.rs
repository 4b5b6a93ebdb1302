//! # Metadata & Enrichment Module
//!
//! Reads what tracks carry locally and backfills missing lyrics and covers
//! from a remote source, caching the results on disk.
//!
//! ## Overview
//!
//! - [`extractor`]: tags, embedded artwork and lyrics, sidecar `.lrc` files
//! - [`cache`]: the on-disk enrichment cache with unavailable markers
//! - [`remote`] and [`providers`]: the remote enricher seam and the LrcCX client
//! - [`coordinator`]: de-duplicated, bounded background fetching

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod extractor;
pub mod in_flight;
pub mod models;
pub mod providers;
pub mod remote;

pub use cache::MetadataCacheStore;
pub use coordinator::{EnrichmentCoordinator, EnsureOutcome};
pub use error::{MetadataError, Result};
pub use extractor::{LocalMetadata, LocalMetadataReader, TagStatus};
pub use models::{
    CoverImage, CoverRef, EnrichmentField, EnrichmentRecord, FieldOutcome, FieldSet, FieldState,
    LocalAvailability, MissReason, RecordSource, RecordStatus, RemoteFetchResult,
};
pub use providers::LrcCxEnricher;
pub use remote::RemoteEnricher;
