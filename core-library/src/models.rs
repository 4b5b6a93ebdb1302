//! Domain models for the music library
//!
//! A track is addressed by a [`TrackIdentity`] derived from where it lives in
//! the library tree and its [`FileStamp`]. Editing or replacing a file yields a
//! new identity, so cached enrichment for the old generation is never reused.

use crate::error::{LibraryError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Artist placeholder used when tags carry no artist.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Album placeholder used when tags carry no album.
pub const UNKNOWN_ALBUM: &str = "Unknown Album";

// =============================================================================
// Identity
// =============================================================================

/// Size and modification time of a file at scan time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileStamp {
    pub size: u64,
    /// Unix milliseconds; `None` when the platform cannot report it
    pub modified_at: Option<i64>,
}

/// Stable key for one generation of one library file.
///
/// Lowercase hex SHA-256 over the library-relative path (with `/`
/// separators), the file size and the modification time. Used verbatim as the
/// cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackIdentity(String);

impl TrackIdentity {
    pub fn derive(relative_path: &Path, stamp: &FileStamp) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalized_relative_path(relative_path).as_bytes());
        hasher.update([0u8]);
        hasher.update(stamp.size.to_le_bytes());
        hasher.update(stamp.modified_at.unwrap_or(0).to_le_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Parse a key previously produced by [`TrackIdentity::derive`].
    pub fn from_hex(value: &str) -> Result<Self> {
        let valid = value.len() == 64
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(LibraryError::InvalidIdentity(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TrackIdentity {
    type Error = LibraryError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<TrackIdentity> for String {
    fn from(identity: TrackIdentity) -> Self {
        identity.0
    }
}

fn normalized_relative_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

// =============================================================================
// Scan output
// =============================================================================

/// An audio file found by the scanner, before any tag reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedFile {
    pub identity: TrackIdentity,
    /// Absolute path
    pub path: PathBuf,
    /// Path relative to the music root
    pub relative_path: PathBuf,
    pub stamp: FileStamp,
}

impl ScannedFile {
    pub fn new(root: &Path, path: PathBuf, stamp: FileStamp) -> Self {
        let relative_path = path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone());
        let identity = TrackIdentity::derive(&relative_path, &stamp);
        Self {
            identity,
            path,
            relative_path,
            stamp,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name without extension
    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// Textual tags read from a file. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

/// What the rest of the system knows about a library track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub identity: TrackIdentity,
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub file_name: String,
    /// Tag title, else the file stem
    pub title: String,
    /// Tag artist, else [`UNKNOWN_ARTIST`]
    pub artist: String,
    /// Tag album, else [`UNKNOWN_ALBUM`]
    pub album: String,
    pub size: u64,
    pub modified_at: Option<i64>,
    pub has_embedded_cover: bool,
}

impl TrackDescriptor {
    pub fn new(scanned: ScannedFile, tags: TrackTags, has_embedded_cover: bool) -> Self {
        let file_name = scanned.file_name();
        let title = non_empty(tags.title).unwrap_or_else(|| scanned.file_stem());
        let artist = non_empty(tags.artist).unwrap_or_else(|| UNKNOWN_ARTIST.to_string());
        let album = non_empty(tags.album).unwrap_or_else(|| UNKNOWN_ALBUM.to_string());

        Self {
            identity: scanned.identity,
            path: scanned.path,
            relative_path: scanned.relative_path,
            file_name,
            title,
            artist,
            album,
            size: scanned.stamp.size,
            modified_at: scanned.stamp.modified_at,
            has_embedded_cover,
        }
    }

    /// A remote lookup needs a real artist and a title.
    pub fn is_searchable(&self) -> bool {
        self.artist != UNKNOWN_ARTIST && !self.title.trim().is_empty()
    }

    /// Album name for remote queries, `None` for the placeholder.
    pub fn known_album(&self) -> Option<&str> {
        let known = self.album != UNKNOWN_ALBUM && !self.album.trim().is_empty();
        known.then_some(self.album.as_str())
    }

    /// Size in megabytes rounded to two decimals.
    pub fn size_mb(&self) -> f64 {
        (self.size as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(size: u64, modified_at: i64) -> FileStamp {
        FileStamp {
            size,
            modified_at: Some(modified_at),
        }
    }

    #[test]
    fn test_identity_changes_with_file_generation() {
        let path = Path::new("Artist/Album/01 song.mp3");
        let original = TrackIdentity::derive(path, &stamp(1000, 1_700_000_000_000));

        assert_eq!(
            original,
            TrackIdentity::derive(path, &stamp(1000, 1_700_000_000_000))
        );
        assert_ne!(
            original,
            TrackIdentity::derive(path, &stamp(1001, 1_700_000_000_000))
        );
        assert_ne!(
            original,
            TrackIdentity::derive(path, &stamp(1000, 1_700_000_000_001))
        );
        assert_ne!(
            original,
            TrackIdentity::derive(
                Path::new("Artist/Album/02 song.mp3"),
                &stamp(1000, 1_700_000_000_000)
            )
        );
    }

    #[test]
    fn test_identity_ignores_separator_style() {
        let s = stamp(5, 5);
        let a = TrackIdentity::derive(Path::new("a/b.mp3"), &s);
        let b = TrackIdentity::derive(Path::new("./a//b.mp3"), &s);
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_hex_parsing() {
        let id = TrackIdentity::derive(Path::new("x.flac"), &stamp(1, 1));
        assert_eq!(id.as_str().len(), 64);
        assert_eq!(TrackIdentity::from_hex(id.as_str()).unwrap(), id);

        assert!(TrackIdentity::from_hex("../../etc/passwd").is_err());
        assert!(TrackIdentity::from_hex(&id.as_str().to_uppercase()).is_err());
    }

    #[test]
    fn test_identity_serde_validates() {
        let id = TrackIdentity::derive(Path::new("x.flac"), &stamp(1, 1));
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        assert!(serde_json::from_str::<TrackIdentity>("\"nope\"").is_err());
    }

    #[test]
    fn test_descriptor_defaults_from_filename() {
        let scanned = ScannedFile::new(
            Path::new("/music"),
            PathBuf::from("/music/Misc/track one.mp3"),
            stamp(3 * 1024 * 1024, 0),
        );
        let descriptor = TrackDescriptor::new(scanned, TrackTags::default(), false);

        assert_eq!(descriptor.relative_path, PathBuf::from("Misc/track one.mp3"));
        assert_eq!(descriptor.file_name, "track one.mp3");
        assert_eq!(descriptor.title, "track one");
        assert_eq!(descriptor.artist, UNKNOWN_ARTIST);
        assert_eq!(descriptor.album, UNKNOWN_ALBUM);
        assert_eq!(descriptor.size_mb(), 3.0);
        assert!(!descriptor.is_searchable());
        assert_eq!(descriptor.known_album(), None);
    }

    #[test]
    fn test_descriptor_uses_tags() {
        let scanned = ScannedFile::new(
            Path::new("/music"),
            PathBuf::from("/music/a.flac"),
            stamp(10, 0),
        );
        let tags = TrackTags {
            title: Some("Yesterday".to_string()),
            artist: Some("The Beatles".to_string()),
            album: Some("  ".to_string()),
        };
        let descriptor = TrackDescriptor::new(scanned, tags, true);

        assert_eq!(descriptor.title, "Yesterday");
        assert_eq!(descriptor.artist, "The Beatles");
        assert_eq!(descriptor.album, UNKNOWN_ALBUM);
        assert!(descriptor.is_searchable());
        assert!(descriptor.has_embedded_cover);
    }
}
