//! # Metadata Cache Store
//!
//! Persists remote enrichment results under the cache root, keyed by
//! [`TrackIdentity`].
//!
//! ## Layout
//!
//! ```text
//! <cache_dir>/
//!   lyrics/<key>.lrc            lyrics text
//!   lyrics/<key>.unavailable    JSON marker {"key", "checked_at"}
//!   covers/<key>.img            cover bytes, MIME sniffed on read
//!   covers/<key>.unavailable
//! ```
//!
//! Every write goes through [`FileSystemAccess::write_file_atomic`], so a
//! reader sees either the previous file or the complete new one. Concurrent
//! writers to one key resolve by last-writer-wins on rename. Writing content
//! for a field removes its unavailable marker. The content file's
//! modification time is the field's fetch time.
//!
//! A cover file that does not sniff as an image is deleted on read, so the
//! field reads as missing and gets fetched again.

use bridge_traits::{Clock, FileSystemAccess};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use core_library::TrackIdentity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{MetadataError, Result};
use crate::models::{
    CoverImage, CoverRef, EnrichmentField, EnrichmentRecord, FieldOutcome, FieldState,
    RecordSource, RemoteFetchResult,
};

const LYRICS_DIR: &str = "lyrics";
const COVERS_DIR: &str = "covers";
const MARKER_EXTENSION: &str = "unavailable";

#[derive(Debug, Serialize, Deserialize)]
struct UnavailableMarker {
    key: String,
    /// Unix seconds
    checked_at: i64,
}

/// Cache of enrichment results on top of [`FileSystemAccess`].
#[derive(Clone)]
pub struct MetadataCacheStore {
    fs: Arc<dyn FileSystemAccess>,
    root: PathBuf,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
}

impl MetadataCacheStore {
    pub fn new(
        fs: Arc<dyn FileSystemAccess>,
        root: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
        cooldown: Duration,
    ) -> Self {
        Self {
            fs,
            root: root.into(),
            clock,
            cooldown,
        }
    }

    /// Create the namespace directories.
    pub async fn init(&self) -> Result<()> {
        for dir in [LYRICS_DIR, COVERS_DIR] {
            self.fs.create_dir_all(&self.root.join(dir)).await?;
        }
        info!(root = %self.root.display(), "Metadata cache ready");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn content_path(&self, identity: &TrackIdentity, field: EnrichmentField) -> PathBuf {
        let (dir, ext) = match field {
            EnrichmentField::Lyrics => (LYRICS_DIR, "lrc"),
            EnrichmentField::Cover => (COVERS_DIR, "img"),
        };
        self.root.join(dir).join(format!("{}.{}", identity, ext))
    }

    pub fn marker_path(&self, identity: &TrackIdentity, field: EnrichmentField) -> PathBuf {
        let dir = match field {
            EnrichmentField::Lyrics => LYRICS_DIR,
            EnrichmentField::Cover => COVERS_DIR,
        };
        self.root
            .join(dir)
            .join(format!("{}.{}", identity, MARKER_EXTENSION))
    }

    /// Persisted state of one field. Unreadable markers and corrupt covers
    /// count as missing.
    pub async fn field_state(
        &self,
        identity: &TrackIdentity,
        field: EnrichmentField,
    ) -> Result<FieldState> {
        let present = match field {
            EnrichmentField::Lyrics => self.fs.exists(&self.content_path(identity, field)).await?,
            EnrichmentField::Cover => self.read_cover(identity).await?.is_some(),
        };
        if present {
            return Ok(FieldState::Present);
        }

        let marker_path = self.marker_path(identity, field);
        let bytes = match self.fs.read_file(&marker_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(FieldState::Missing),
            Err(e) => return Err(e.into()),
        };

        let marker = match serde_json::from_slice::<UnavailableMarker>(&bytes) {
            Ok(marker) => marker,
            Err(e) => {
                warn!(path = %marker_path.display(), error = %e, "Ignoring unreadable marker");
                return Ok(FieldState::Missing);
            }
        };

        match Utc.timestamp_opt(marker.checked_at, 0).single() {
            Some(checked_at) => Ok(FieldState::Unavailable { checked_at }),
            None => Ok(FieldState::Missing),
        }
    }

    /// True when the field needs no remote attempt: content is present, or
    /// an unavailable marker is still inside the cooldown window.
    pub async fn has(&self, identity: &TrackIdentity, field: EnrichmentField) -> Result<bool> {
        Ok(match self.field_state(identity, field).await? {
            FieldState::Present => true,
            FieldState::Unavailable { checked_at } => self.within_cooldown(checked_at),
            FieldState::Missing => false,
        })
    }

    fn within_cooldown(&self, checked_at: DateTime<Utc>) -> bool {
        let elapsed = self.clock.now().signed_duration_since(checked_at);
        match chrono::Duration::from_std(self.cooldown) {
            Ok(cooldown) => elapsed < cooldown,
            Err(_) => true,
        }
    }

    /// Everything cached for `identity`, or `None` when nothing is.
    pub async fn get(&self, identity: &TrackIdentity) -> Result<Option<EnrichmentRecord>> {
        let lyrics_state = self.field_state(identity, EnrichmentField::Lyrics).await?;
        let cover_state = self.field_state(identity, EnrichmentField::Cover).await?;

        if lyrics_state == FieldState::Missing && cover_state == FieldState::Missing {
            return Ok(None);
        }

        let mut record = EnrichmentRecord::empty(identity.clone(), RecordSource::Cache);
        record.lyrics_state = lyrics_state;
        record.cover_state = cover_state;

        if lyrics_state == FieldState::Present {
            record.lyrics = self.read_lyrics(identity).await?;
        }
        if cover_state == FieldState::Present {
            let path = self.content_path(identity, EnrichmentField::Cover);
            record.cover = self.read_cover(identity).await?.map(|image| CoverRef {
                key: identity.to_string(),
                path: Some(path),
                mime_type: image.mime_type,
            });
        }

        // Content may vanish between the state check and the read.
        if record.lyrics.is_none() && record.lyrics_state == FieldState::Present {
            record.lyrics_state = FieldState::Missing;
        }
        if record.cover.is_none() && record.cover_state == FieldState::Present {
            record.cover_state = FieldState::Missing;
        }

        let mut fetched = Vec::with_capacity(2);
        for field in EnrichmentField::ALL {
            match record.state(field) {
                FieldState::Unavailable { checked_at } => fetched.push(checked_at),
                FieldState::Present => {
                    fetched.extend(self.content_written_at(identity, field).await)
                }
                FieldState::Missing => {}
            }
        }
        record.fetched_at = fetched.into_iter().max();
        record.refresh_status();
        Ok(Some(record))
    }

    /// Modification time of the content file for `field`.
    async fn content_written_at(
        &self,
        identity: &TrackIdentity,
        field: EnrichmentField,
    ) -> Option<DateTime<Utc>> {
        let path = self.content_path(identity, field);
        match self.fs.metadata(&path).await {
            Ok(metadata) => metadata
                .modified_at
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            Err(e) => {
                debug!(
                    path = %path.display(),
                    error = %e,
                    "No modification time for cached content"
                );
                None
            }
        }
    }

    /// Merge a remote result: found fields are written, requested but
    /// unavailable fields are marked, unrequested fields are untouched.
    pub async fn put(&self, identity: &TrackIdentity, result: &RemoteFetchResult) -> Result<()> {
        let now = self.clock.now();

        match &result.lyrics {
            FieldOutcome::Found(text) => self.put_lyrics(identity, text).await?,
            FieldOutcome::Unavailable(_) => {
                self.mark_unavailable(identity, EnrichmentField::Lyrics, now)
                    .await?
            }
            FieldOutcome::NotRequested => {}
        }

        match &result.cover {
            FieldOutcome::Found(image) => self.put_cover(identity, image).await?,
            FieldOutcome::Unavailable(_) => {
                self.mark_unavailable(identity, EnrichmentField::Cover, now)
                    .await?
            }
            FieldOutcome::NotRequested => {}
        }

        Ok(())
    }

    pub async fn put_lyrics(&self, identity: &TrackIdentity, text: &str) -> Result<()> {
        self.write_content(
            identity,
            EnrichmentField::Lyrics,
            Bytes::copy_from_slice(text.as_bytes()),
        )
        .await
    }

    pub async fn put_cover(&self, identity: &TrackIdentity, image: &CoverImage) -> Result<()> {
        self.write_content(identity, EnrichmentField::Cover, image.data.clone())
            .await
    }

    async fn write_content(
        &self,
        identity: &TrackIdentity,
        field: EnrichmentField,
        data: Bytes,
    ) -> Result<()> {
        let path = self.content_path(identity, field);
        self.fs
            .write_file_atomic(&path, data)
            .await
            .map_err(|e| MetadataError::CacheWrite {
                key: identity.to_string(),
                message: e.to_string(),
            })?;
        self.fs
            .remove_if_exists(&self.marker_path(identity, field))
            .await?;
        debug!(key = %identity, field = %field, "Cached enrichment content");
        Ok(())
    }

    /// Record that a remote attempt found nothing at `at`.
    ///
    /// Content already present for the field is kept and no marker is
    /// written.
    pub async fn mark_unavailable(
        &self,
        identity: &TrackIdentity,
        field: EnrichmentField,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.fs.exists(&self.content_path(identity, field)).await? {
            return Ok(());
        }

        let marker = UnavailableMarker {
            key: identity.to_string(),
            checked_at: at.timestamp(),
        };
        let data = serde_json::to_vec(&marker)
            .map_err(|e| MetadataError::InvalidCacheEntry(e.to_string()))?;

        self.fs
            .write_file_atomic(&self.marker_path(identity, field), Bytes::from(data))
            .await
            .map_err(|e| MetadataError::CacheWrite {
                key: identity.to_string(),
                message: e.to_string(),
            })?;
        debug!(key = %identity, field = %field, "Marked enrichment field unavailable");
        Ok(())
    }

    pub async fn read_lyrics(&self, identity: &TrackIdentity) -> Result<Option<String>> {
        let path = self.content_path(identity, EnrichmentField::Lyrics);
        match self.fs.read_file(&path).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Cached cover bytes with a sniffed MIME type. Bytes that are not a
    /// recognisable image read as absent and are deleted.
    pub async fn read_cover(&self, identity: &TrackIdentity) -> Result<Option<CoverImage>> {
        let path = self.content_path(identity, EnrichmentField::Cover);
        let bytes = match self.fs.read_file(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let image = CoverImage::sniff(bytes);
        if image.is_none() {
            warn!(
                path = %path.display(),
                "Discarding cached cover that is not a recognisable image"
            );
            self.fs.remove_if_exists(&path).await?;
        }
        Ok(image)
    }

    /// Drop every cached file for `identity`.
    pub async fn remove(&self, identity: &TrackIdentity) -> Result<()> {
        for field in EnrichmentField::ALL {
            self.fs
                .remove_if_exists(&self.content_path(identity, field))
                .await?;
            self.fs
                .remove_if_exists(&self.marker_path(identity, field))
                .await?;
        }
        Ok(())
    }
}
