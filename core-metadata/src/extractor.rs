//! Local Metadata Reader
//!
//! Reads what a track already carries without any network access: textual
//! tags, embedded artwork, embedded lyrics and a sibling `.lrc` file.
//!
//! ## Overview
//!
//! - Tags are parsed with `lofty` (ID3v2, Vorbis Comments, MP4, FLAC).
//! - A sidecar `<stem>.lrc` in the same directory wins over embedded lyrics.
//! - Missing or malformed tags never fail the read. A corrupt container
//!   degrades to a filename-derived title.
//! - Sidecar files are decoded as lossy UTF-8.
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::extractor::LocalMetadataReader;
//!
//! let reader = LocalMetadataReader::new(fs);
//! let local = reader.read_local(Path::new("/music/song.mp3")).await?;
//! if let Some(lyrics) = local.lyrics() {
//!     println!("{lyrics}");
//! }
//! ```

use bridge_traits::FileSystemAccess;
use bytes::Bytes;
use core_library::TrackTags;
use lofty::config::ParseOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{MimeType, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{MetadataError, Result};
use crate::models::{CoverImage, LocalAvailability};

/// How far tag parsing got for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStatus {
    Parsed,
    /// The container parsed but holds no tag
    Missing,
    /// The container could not be parsed; fields come from the file name
    Corrupt,
}

/// Everything a track provides locally.
#[derive(Debug, Clone)]
pub struct LocalMetadata {
    pub tags: TrackTags,
    pub embedded_cover: Option<CoverImage>,
    pub sidecar_lyrics: Option<String>,
    pub embedded_lyrics: Option<String>,
    pub tag_status: TagStatus,
}

impl LocalMetadata {
    /// Sidecar lyrics, then embedded lyrics.
    pub fn lyrics(&self) -> Option<&str> {
        self.sidecar_lyrics
            .as_deref()
            .or(self.embedded_lyrics.as_deref())
    }

    pub fn availability(&self) -> LocalAvailability {
        LocalAvailability {
            lyrics: self.lyrics().is_some(),
            cover: self.embedded_cover.is_some(),
        }
    }
}

/// Tag fields pulled from one parsed container.
#[derive(Debug, Default)]
struct ParsedTags {
    tags: TrackTags,
    cover: Option<CoverImage>,
    lyrics: Option<String>,
}

/// Reads local metadata through a [`FileSystemAccess`].
#[derive(Clone)]
pub struct LocalMetadataReader {
    fs: Arc<dyn FileSystemAccess>,
    parse_options: ParseOptions,
}

impl LocalMetadataReader {
    pub fn new(fs: Arc<dyn FileSystemAccess>) -> Self {
        Self::with_options(fs, ParseOptions::new())
    }

    pub fn with_options(fs: Arc<dyn FileSystemAccess>, parse_options: ParseOptions) -> Self {
        Self { fs, parse_options }
    }

    /// Read tags, embedded artwork and lyrics for `path`.
    ///
    /// # Errors
    ///
    /// Only [`MetadataError::FileUnreadable`] when the audio file itself
    /// cannot be read. Tag problems degrade instead of failing.
    pub async fn read_local(&self, path: &Path) -> Result<LocalMetadata> {
        debug!(path = %path.display(), "Reading local metadata");

        let data = self
            .fs
            .read_file(path)
            .await
            .map_err(|e| MetadataError::FileUnreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let (parsed, tag_status) = match self.parse(path, data).await {
            Ok(Some(parsed)) => (parsed, TagStatus::Parsed),
            Ok(None) => {
                debug!(path = %path.display(), "No tags found, using file name as title");
                (ParsedTags::default(), TagStatus::Missing)
            }
            Err(e) => {
                warn!(error = %e, "Falling back to file name metadata");
                (ParsedTags::default(), TagStatus::Corrupt)
            }
        };

        let mut tags = parsed.tags;
        if tags.title.is_none() {
            tags.title = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(normalize_text)
                .filter(|t| !t.is_empty());
        }

        let sidecar_lyrics = self.read_sidecar_lyrics(path).await;

        Ok(LocalMetadata {
            tags,
            embedded_cover: parsed.cover,
            sidecar_lyrics,
            embedded_lyrics: parsed.lyrics,
            tag_status,
        })
    }

    /// First front cover embedded in `path`, else the first picture.
    pub async fn read_embedded_cover(&self, path: &Path) -> Result<Option<CoverImage>> {
        let data = self
            .fs
            .read_file(path)
            .await
            .map_err(|e| MetadataError::FileUnreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        match self.parse(path, data).await {
            Ok(parsed) => Ok(parsed.and_then(|p| p.cover)),
            Err(e) => {
                warn!(error = %e, "Cannot read embedded cover");
                Ok(None)
            }
        }
    }

    async fn parse(&self, path: &Path, data: Bytes) -> Result<Option<ParsedTags>> {
        let options = self.parse_options;
        let owned_path = path.to_path_buf();
        let join =
            tokio::task::spawn_blocking(move || parse_tags(&owned_path, data, options)).await;

        match join {
            Ok(result) => result,
            Err(e) => Err(MetadataError::TagCorrupt {
                path: path.to_path_buf(),
                message: format!("tag parser panicked: {}", e),
            }),
        }
    }

    async fn read_sidecar_lyrics(&self, path: &Path) -> Option<String> {
        let sidecar = sidecar_path(path);
        match self.fs.read_file(&sidecar).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                if text.trim().is_empty() {
                    None
                } else {
                    debug!(path = %sidecar.display(), "Using sidecar lyrics");
                    Some(text)
                }
            }
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!(path = %sidecar.display(), error = %e, "Cannot read sidecar lyrics");
                None
            }
        }
    }
}

/// `<dir>/<stem>.lrc` for an audio file.
pub fn sidecar_path(path: &Path) -> PathBuf {
    path.with_extension("lrc")
}

fn parse_tags(path: &Path, data: Bytes, options: ParseOptions) -> Result<Option<ParsedTags>> {
    let corrupt = |e: lofty::error::LoftyError| MetadataError::TagCorrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let tagged_file = Probe::new(Cursor::new(data))
        .options(options)
        .guess_file_type()
        .map_err(|e| MetadataError::TagCorrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .read()
        .map_err(corrupt)?;

    let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
        return Ok(None);
    };

    let text = |value: Option<std::borrow::Cow<'_, str>>| {
        value
            .map(|s| normalize_text(s.as_ref()))
            .filter(|s| !s.is_empty())
    };

    Ok(Some(ParsedTags {
        tags: TrackTags {
            title: text(tag.title()),
            artist: text(tag.artist()),
            album: text(tag.album()),
        },
        cover: extract_cover(tag),
        lyrics: tag
            .get_string(&ItemKey::Lyrics)
            .map(str::to_string)
            .filter(|l| !l.trim().is_empty()),
    }))
}

fn extract_cover(tag: &Tag) -> Option<CoverImage> {
    let pictures = tag.pictures();
    let picture = pictures
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())?;

    if picture.data().is_empty() {
        return None;
    }

    let data = Bytes::copy_from_slice(picture.data());
    match picture.mime_type().and_then(mime_type_to_string) {
        Some(mime_type) => Some(CoverImage::new(data, mime_type)),
        None => CoverImage::sniff(data),
    }
}

fn mime_type_to_string(mime_type: &MimeType) -> Option<String> {
    let mime = match mime_type {
        MimeType::Png => "image/png",
        MimeType::Jpeg => "image/jpeg",
        MimeType::Tiff => "image/tiff",
        MimeType::Bmp => "image/bmp",
        MimeType::Gif => "image/gif",
        _ => return None,
    };
    Some(mime.to_string())
}

/// Trim, collapse runs of whitespace and drop control characters.
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}
