//! Enrichment data types shared by the cache, the remote enricher and the
//! coordinator.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_library::TrackIdentity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// =============================================================================
// Fields
// =============================================================================

/// A piece of enrichment data that can be missing for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentField {
    Lyrics,
    Cover,
}

impl EnrichmentField {
    pub const ALL: [EnrichmentField; 2] = [EnrichmentField::Lyrics, EnrichmentField::Cover];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentField::Lyrics => "lyrics",
            EnrichmentField::Cover => "cover",
        }
    }
}

impl fmt::Display for EnrichmentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Small set of [`EnrichmentField`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FieldSet {
    lyrics: bool,
    cover: bool,
}

impl FieldSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            lyrics: true,
            cover: true,
        }
    }

    pub fn only(field: EnrichmentField) -> Self {
        Self::empty().with(field)
    }

    pub fn with(mut self, field: EnrichmentField) -> Self {
        self.insert(field);
        self
    }

    pub fn insert(&mut self, field: EnrichmentField) {
        match field {
            EnrichmentField::Lyrics => self.lyrics = true,
            EnrichmentField::Cover => self.cover = true,
        }
    }

    pub fn contains(&self, field: EnrichmentField) -> bool {
        match field {
            EnrichmentField::Lyrics => self.lyrics,
            EnrichmentField::Cover => self.cover,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.lyrics && !self.cover
    }

    pub fn iter(&self) -> impl Iterator<Item = EnrichmentField> + '_ {
        EnrichmentField::ALL
            .into_iter()
            .filter(move |field| self.contains(*field))
    }

    /// Field names, for logs and events
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|f| f.as_str().to_string()).collect()
    }
}

/// What is already available for a track without a remote call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalAvailability {
    pub lyrics: bool,
    pub cover: bool,
}

impl LocalAvailability {
    pub fn has(&self, field: EnrichmentField) -> bool {
        match field {
            EnrichmentField::Lyrics => self.lyrics,
            EnrichmentField::Cover => self.cover,
        }
    }
}

// =============================================================================
// Images
// =============================================================================

/// Cover bytes with their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub data: Bytes,
    pub mime_type: String,
}

impl CoverImage {
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Sniff the MIME type from the image header.
    pub fn sniff(data: impl Into<Bytes>) -> Option<Self> {
        let data = data.into();
        let format = image::guess_format(&data).ok()?;
        Some(Self {
            mime_type: format.to_mime_type().to_string(),
            data,
        })
    }
}

/// Reference to a cover without its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverRef {
    /// Cache key (the track identity)
    pub key: String,
    /// Cache file, `None` for covers embedded in the audio file
    pub path: Option<PathBuf>,
    pub mime_type: String,
}

// =============================================================================
// Remote results
// =============================================================================

/// Why a requested field was not obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissReason {
    /// Unknown artist or empty title; no request was made
    NotSearchable,
    /// The provider answered but had nothing usable
    NotFound,
    Timeout,
    Error(String),
}

/// Outcome for one field of a remote fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome<T> {
    NotRequested,
    Found(T),
    Unavailable(MissReason),
}

impl<T> FieldOutcome<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, FieldOutcome::Found(_))
    }

    pub fn found(&self) -> Option<&T> {
        match self {
            FieldOutcome::Found(value) => Some(value),
            _ => None,
        }
    }
}

/// Terminal result of one remote fetch. There is no error case: every
/// failure is expressed per field as [`FieldOutcome::Unavailable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFetchResult {
    pub lyrics: FieldOutcome<String>,
    pub cover: FieldOutcome<CoverImage>,
}

impl RemoteFetchResult {
    /// Every requested field unavailable for the same reason.
    pub fn unavailable(requested: FieldSet, reason: MissReason) -> Self {
        let outcome = |field| {
            if requested.contains(field) {
                Some(reason.clone())
            } else {
                None
            }
        };
        Self {
            lyrics: outcome(EnrichmentField::Lyrics)
                .map(FieldOutcome::Unavailable)
                .unwrap_or(FieldOutcome::NotRequested),
            cover: outcome(EnrichmentField::Cover)
                .map(FieldOutcome::Unavailable)
                .unwrap_or(FieldOutcome::NotRequested),
        }
    }

    pub fn not_requested() -> Self {
        Self {
            lyrics: FieldOutcome::NotRequested,
            cover: FieldOutcome::NotRequested,
        }
    }

    pub fn found_fields(&self) -> FieldSet {
        let mut set = FieldSet::empty();
        if self.lyrics.is_found() {
            set.insert(EnrichmentField::Lyrics);
        }
        if self.cover.is_found() {
            set.insert(EnrichmentField::Cover);
        }
        set
    }
}

// =============================================================================
// Records
// =============================================================================

/// Persisted state of one field for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FieldState {
    Present,
    /// A remote attempt found nothing at `checked_at`
    Unavailable { checked_at: DateTime<Utc> },
    Missing,
}

/// Where a record's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    /// Sidecar file or embedded tags
    Local,
    /// Persisted enrichment cache
    Cache,
    /// A fetch that just completed
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Lyrics and cover are both present
    Complete,
    /// Something is still missing and may yet be fetched
    Partial,
    /// Nothing is present and every field is marked unavailable
    Unavailable,
}

/// Best-known enrichment for a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub identity: TrackIdentity,
    pub lyrics: Option<String>,
    pub cover: Option<CoverRef>,
    pub lyrics_state: FieldState,
    pub cover_state: FieldState,
    pub source: RecordSource,
    pub fetched_at: Option<DateTime<Utc>>,
    pub status: RecordStatus,
}

impl EnrichmentRecord {
    /// Record with nothing known yet.
    pub fn empty(identity: TrackIdentity, source: RecordSource) -> Self {
        Self {
            identity,
            lyrics: None,
            cover: None,
            lyrics_state: FieldState::Missing,
            cover_state: FieldState::Missing,
            source,
            fetched_at: None,
            status: RecordStatus::Partial,
        }
    }

    pub fn state(&self, field: EnrichmentField) -> FieldState {
        match field {
            EnrichmentField::Lyrics => self.lyrics_state,
            EnrichmentField::Cover => self.cover_state,
        }
    }

    /// Recompute [`EnrichmentRecord::status`] from the field states.
    pub fn refresh_status(&mut self) {
        let states = [self.lyrics_state, self.cover_state];
        self.status = if states.iter().all(|s| *s == FieldState::Present) {
            RecordStatus::Complete
        } else if states
            .iter()
            .all(|s| matches!(s, FieldState::Unavailable { .. }))
        {
            RecordStatus::Unavailable
        } else {
            RecordStatus::Partial
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::FileStamp;
    use std::path::Path;

    fn identity() -> TrackIdentity {
        TrackIdentity::derive(
            Path::new("a.mp3"),
            &FileStamp {
                size: 1,
                modified_at: Some(1),
            },
        )
    }

    #[test]
    fn test_field_set_operations() {
        let set = FieldSet::only(EnrichmentField::Cover);
        assert!(set.contains(EnrichmentField::Cover));
        assert!(!set.contains(EnrichmentField::Lyrics));
        assert_eq!(set.names(), vec!["cover"]);

        assert!(FieldSet::empty().is_empty());
        assert_eq!(FieldSet::all().iter().count(), 2);
    }

    #[test]
    fn test_unavailable_result_only_marks_requested_fields() {
        let result = RemoteFetchResult::unavailable(
            FieldSet::only(EnrichmentField::Lyrics),
            MissReason::Timeout,
        );
        assert_eq!(result.lyrics, FieldOutcome::Unavailable(MissReason::Timeout));
        assert_eq!(result.cover, FieldOutcome::NotRequested);
        assert!(result.found_fields().is_empty());
    }

    #[test]
    fn test_record_status_follows_field_states() {
        let at = Utc::now();
        let mut record = EnrichmentRecord::empty(identity(), RecordSource::Cache);
        record.refresh_status();
        assert_eq!(record.status, RecordStatus::Partial);

        record.lyrics_state = FieldState::Present;
        record.cover_state = FieldState::Present;
        record.refresh_status();
        assert_eq!(record.status, RecordStatus::Complete);

        record.lyrics_state = FieldState::Unavailable { checked_at: at };
        record.refresh_status();
        assert_eq!(record.status, RecordStatus::Partial);
        assert_eq!(
            record.state(EnrichmentField::Lyrics),
            FieldState::Unavailable { checked_at: at }
        );

        record.cover_state = FieldState::Unavailable { checked_at: at };
        record.refresh_status();
        assert_eq!(record.status, RecordStatus::Unavailable);
    }

    #[test]
    fn test_cover_sniffing() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        let image = CoverImage::sniff(png.to_vec()).unwrap();
        assert_eq!(image.mime_type, "image/png");

        assert!(CoverImage::sniff(b"<html>".to_vec()).is_none());
    }
}
