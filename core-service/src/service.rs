//! The query façade.
//!
//! Answers "what do we know about track T right now" from local files and
//! the enrichment cache, and asks the coordinator to backfill whatever is
//! missing. No method here waits on the network.

use core_library::{LibraryScanner, ScannedFile, TrackDescriptor, TrackIdentity};
use core_metadata::{
    CoverImage, CoverRef, EnrichmentCoordinator, EnrichmentRecord, EnsureOutcome, FieldState,
    LocalAvailability, LocalMetadata, LocalMetadataReader, LrcCxEnricher, MetadataCacheStore,
    RecordSource, RemoteEnricher, TagStatus,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, Receiver};
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::error::{CoreError, Result};

/// Files whose tags are read concurrently during a scan.
const TAG_READ_CONCURRENCY: usize = 8;

/// Outcome of one library scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub tracks: usize,
    /// Entries the scanner or the tag reader could not read
    pub skipped: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LyricsLookup {
    Ready(String),
    /// Nothing local or cached yet; a fetch may be underway
    NotYetAvailable,
}

impl LyricsLookup {
    pub fn is_ready(&self) -> bool {
        matches!(self, LyricsLookup::Ready(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverLookup {
    Ready(CoverImage),
    NotYetAvailable,
}

impl CoverLookup {
    pub fn is_ready(&self) -> bool {
        matches!(self, CoverLookup::Ready(_))
    }
}

/// Per-outcome counts from [`CoreService::enrich_library`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichSummary {
    pub satisfied: usize,
    pub already_in_flight: usize,
    pub scheduled: usize,
    pub dropped: usize,
    pub shut_down: usize,
}

impl EnrichSummary {
    fn record(&mut self, outcome: EnsureOutcome) {
        match outcome {
            EnsureOutcome::Satisfied => self.satisfied += 1,
            EnsureOutcome::AlreadyInFlight => self.already_in_flight += 1,
            EnsureOutcome::Scheduled => self.scheduled += 1,
            EnsureOutcome::Dropped => self.dropped += 1,
            EnsureOutcome::ShutDown => self.shut_down += 1,
        }
    }
}

/// Descriptors from the last scan, in listing order.
struct DescriptorIndex {
    ordered: Vec<TrackDescriptor>,
    by_id: HashMap<TrackIdentity, usize>,
    local: HashMap<TrackIdentity, LocalAvailability>,
}

impl DescriptorIndex {
    fn build(mut entries: Vec<(TrackDescriptor, LocalAvailability)>) -> Self {
        entries.sort_by(|(a, _), (b, _)| {
            a.file_name
                .cmp(&b.file_name)
                .then_with(|| a.relative_path.cmp(&b.relative_path))
        });

        let mut by_id = HashMap::with_capacity(entries.len());
        let mut local = HashMap::with_capacity(entries.len());
        let mut ordered = Vec::with_capacity(entries.len());
        for (position, (descriptor, availability)) in entries.into_iter().enumerate() {
            by_id.insert(descriptor.identity.clone(), position);
            local.insert(descriptor.identity.clone(), availability);
            ordered.push(descriptor);
        }

        Self {
            ordered,
            by_id,
            local,
        }
    }

    fn get(&self, identity: &TrackIdentity) -> Option<&TrackDescriptor> {
        self.by_id.get(identity).map(|&i| &self.ordered[i])
    }
}

struct ServiceInner {
    scanner: LibraryScanner,
    reader: LocalMetadataReader,
    cache: MetadataCacheStore,
    coordinator: EnrichmentCoordinator,
    events: EventBus,
    shutdown_grace: Duration,
    index: RwLock<Option<Arc<DescriptorIndex>>>,
    scan_lock: Mutex<()>,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    inner: Arc<ServiceInner>,
}

impl CoreService {
    /// Start the core with the LrcCX remote enricher.
    pub async fn start(config: CoreConfig) -> Result<Self> {
        let enricher = Arc::new(LrcCxEnricher::new(
            Arc::clone(&config.http_client),
            config.remote_api.clone(),
            Arc::clone(&config.clock),
        ));
        Self::with_enricher(config, enricher).await
    }

    /// Start the core with a custom remote enricher.
    pub async fn with_enricher(
        config: CoreConfig,
        enricher: Arc<dyn RemoteEnricher>,
    ) -> Result<Self> {
        config.validate()?;

        let scanner =
            LibraryScanner::new(Arc::clone(&config.file_system), config.music_root.clone())
                .with_extensions(&config.audio_extensions);
        let reader = LocalMetadataReader::new(Arc::clone(&config.file_system));
        let cache = MetadataCacheStore::new(
            Arc::clone(&config.file_system),
            config.cache_dir.clone(),
            Arc::clone(&config.clock),
            config.enrichment.cooldown,
        );
        cache.init().await.map_err(|e| {
            CoreError::InitializationFailed(format!(
                "cannot prepare cache at {}: {}",
                config.cache_dir.display(),
                e
            ))
        })?;

        let events = EventBus::default();
        let coordinator = EnrichmentCoordinator::start(
            cache.clone(),
            enricher,
            config.enrichment.clone(),
            Some(events.clone()),
        );

        info!(
            music_root = %config.music_root.display(),
            cache_dir = %config.cache_dir.display(),
            "Core service started"
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                scanner,
                reader,
                cache,
                coordinator,
                events,
                shutdown_grace: config.enrichment.shutdown_grace,
                index: RwLock::new(None),
                scan_lock: Mutex::new(()),
            }),
        })
    }

    pub fn coordinator(&self) -> &EnrichmentCoordinator {
        &self.inner.coordinator
    }

    pub fn cache(&self) -> &MetadataCacheStore {
        &self.inner.cache
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.inner.events.subscribe()
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// All library tracks sorted by file name. The first call scans.
    pub async fn get_descriptors(&self) -> Result<Vec<TrackDescriptor>> {
        Ok(self.index().await?.ordered.clone())
    }

    pub async fn descriptor(&self, identity: &TrackIdentity) -> Result<TrackDescriptor> {
        self.index()
            .await?
            .get(identity)
            .cloned()
            .ok_or_else(|| CoreError::TrackNotFound(identity.to_string()))
    }

    async fn index(&self) -> Result<Arc<DescriptorIndex>> {
        if let Some(index) = self.inner.index.read().await.as_ref() {
            return Ok(Arc::clone(index));
        }

        let _scan = self.inner.scan_lock.lock().await;
        if let Some(index) = self.inner.index.read().await.as_ref() {
            return Ok(Arc::clone(index));
        }
        self.scan_locked().await?;

        self.inner
            .index
            .read()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| {
                CoreError::InitializationFailed("library index missing after scan".to_string())
            })
    }

    /// Rescan the music root and replace the descriptor list.
    pub async fn refresh_descriptors(&self) -> Result<ScanSummary> {
        let _scan = self.inner.scan_lock.lock().await;
        self.scan_locked().await
    }

    async fn scan_locked(&self) -> Result<ScanSummary> {
        let started = Instant::now();
        let root = self.inner.scanner.root().display().to_string();
        self.inner
            .events
            .emit(CoreEvent::Library(LibraryEvent::ScanStarted { root: root.clone() }))
            .ok();

        let scan = self.inner.scanner.scan();
        let stats = scan.stats().clone();
        let reader = &self.inner.reader;

        let results: Vec<_> = scan
            .map(|file| async move {
                let local = reader.read_local(&file.path).await;
                (file, local)
            })
            .buffer_unordered(TAG_READ_CONCURRENCY)
            .collect()
            .await;

        let mut unreadable = 0usize;
        let mut entries = Vec::with_capacity(results.len());
        for (file, local) in results {
            match local {
                Ok(local) => entries.push(describe(file, &local)),
                Err(e) => {
                    warn!(error = %e, "Skipping track with unreadable contents");
                    unreadable += 1;
                }
            }
        }

        let index = DescriptorIndex::build(entries);
        let summary = ScanSummary {
            tracks: index.ordered.len(),
            skipped: stats.skipped() + unreadable,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        *self.inner.index.write().await = Some(Arc::new(index));

        info!(
            root = %root,
            tracks = summary.tracks,
            skipped = summary.skipped,
            duration_ms = summary.duration_ms,
            "Library scan completed"
        );
        self.inner
            .events
            .emit(CoreEvent::Library(LibraryEvent::ScanCompleted {
                tracks: summary.tracks,
                skipped: summary.skipped,
            }))
            .ok();

        Ok(summary)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Best-known metadata for a track, local data first, then the cache.
    ///
    /// Missing fields are scheduled for background enrichment; the call
    /// itself returns without waiting for it.
    #[instrument(skip(self, identity), fields(key = %identity))]
    pub async fn query_metadata(&self, identity: &TrackIdentity) -> Result<EnrichmentRecord> {
        let descriptor = self.descriptor(identity).await?;
        let local = self.read_local(&descriptor).await;

        let cached = match self.inner.cache.get(identity).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "Cache read failed, answering from local data");
                None
            }
        };
        let record = compose_record(identity, &local, cached);

        self.request_enrichment(&descriptor, local.availability())
            .await;
        Ok(record)
    }

    /// Sidecar lyrics, then embedded lyrics, then cached lyrics.
    pub async fn get_lyrics(&self, identity: &TrackIdentity) -> Result<LyricsLookup> {
        let descriptor = self.descriptor(identity).await?;
        let local = self.read_local(&descriptor).await;

        let lookup = match local.lyrics() {
            Some(lyrics) => LyricsLookup::Ready(lyrics.to_string()),
            None => match self.inner.cache.read_lyrics(identity).await {
                Ok(Some(lyrics)) => LyricsLookup::Ready(lyrics),
                Ok(None) => LyricsLookup::NotYetAvailable,
                Err(e) => {
                    warn!(key = %identity, error = %e, "Cannot read cached lyrics");
                    LyricsLookup::NotYetAvailable
                }
            },
        };

        self.request_enrichment(&descriptor, local.availability())
            .await;
        Ok(lookup)
    }

    /// Embedded cover, then cached cover.
    pub async fn get_cover(&self, identity: &TrackIdentity) -> Result<CoverLookup> {
        let descriptor = self.descriptor(identity).await?;
        let local = self.read_local(&descriptor).await;
        let availability = local.availability();

        let lookup = match local.embedded_cover {
            Some(cover) => CoverLookup::Ready(cover),
            None => match self.inner.cache.read_cover(identity).await {
                Ok(Some(cover)) => CoverLookup::Ready(cover),
                Ok(None) => CoverLookup::NotYetAvailable,
                Err(e) => {
                    warn!(key = %identity, error = %e, "Cannot read cached cover");
                    CoverLookup::NotYetAvailable
                }
            },
        };

        self.request_enrichment(&descriptor, availability).await;
        Ok(lookup)
    }

    /// Ask the coordinator about every known track.
    pub async fn enrich_library(&self) -> Result<EnrichSummary> {
        let index = self.index().await?;
        let mut summary = EnrichSummary::default();

        for descriptor in &index.ordered {
            let local = index
                .local
                .get(&descriptor.identity)
                .copied()
                .unwrap_or_default();
            summary.record(
                self.inner
                    .coordinator
                    .ensure_enriched(descriptor, local)
                    .await,
            );
        }

        info!(
            scheduled = summary.scheduled,
            satisfied = summary.satisfied,
            dropped = summary.dropped,
            "Library enrichment requested"
        );
        Ok(summary)
    }

    /// Stop background enrichment, giving running fetches `grace` to finish.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.coordinator.shutdown(grace).await;
        info!("Core service stopped");
    }

    /// [`CoreService::shutdown`] with the configured grace period.
    pub async fn close(&self) {
        self.shutdown(self.inner.shutdown_grace).await;
    }

    async fn read_local(&self, descriptor: &TrackDescriptor) -> LocalMetadata {
        match self.inner.reader.read_local(&descriptor.path).await {
            Ok(local) => local,
            Err(e) => {
                warn!(key = %descriptor.identity, error = %e, "Cannot read local metadata");
                LocalMetadata {
                    tags: Default::default(),
                    embedded_cover: None,
                    sidecar_lyrics: None,
                    embedded_lyrics: None,
                    tag_status: TagStatus::Missing,
                }
            }
        }
    }

    async fn request_enrichment(&self, descriptor: &TrackDescriptor, local: LocalAvailability) {
        let outcome = self
            .inner
            .coordinator
            .ensure_enriched(descriptor, local)
            .await;
        debug!(key = %descriptor.identity, outcome = ?outcome, "Enrichment requested");
    }
}

fn describe(file: ScannedFile, local: &LocalMetadata) -> (TrackDescriptor, LocalAvailability) {
    let availability = local.availability();
    let descriptor = TrackDescriptor::new(
        file,
        local.tags.clone(),
        local.embedded_cover.is_some(),
    );
    (descriptor, availability)
}

/// Overlay local data on the cached record; local fields win.
fn compose_record(
    identity: &TrackIdentity,
    local: &LocalMetadata,
    cached: Option<EnrichmentRecord>,
) -> EnrichmentRecord {
    let mut record =
        cached.unwrap_or_else(|| EnrichmentRecord::empty(identity.clone(), RecordSource::Cache));
    let mut used_local = false;

    if let Some(lyrics) = local.lyrics() {
        record.lyrics = Some(lyrics.to_string());
        record.lyrics_state = FieldState::Present;
        used_local = true;
    }
    if let Some(cover) = &local.embedded_cover {
        record.cover = Some(CoverRef {
            key: identity.to_string(),
            path: None,
            mime_type: cover.mime_type.clone(),
        });
        record.cover_state = FieldState::Present;
        used_local = true;
    }

    if used_local {
        record.source = RecordSource::Local;
    }
    record.refresh_status();
    record
}
