//! # Library Scanner
//!
//! Walks the music root and yields every audio file as a [`ScannedFile`].
//!
//! ## Overview
//!
//! - The walk is lazy: directories are listed only as the stream is polled.
//! - Each call to [`LibraryScanner::scan`] starts a fresh walk.
//! - Entries are visited depth-first in sorted order, so two scans of an
//!   unchanged tree yield the same sequence.
//! - Symlinked directories below the root are not descended into, so link
//!   cycles cannot repeat the tree. Symlinked files are yielded.
//! - Unreadable entries are skipped and counted in [`ScanStats`]; they never
//!   end the walk.
//! - Only the extension allowlist decides what counts as audio. The scanner
//!   never opens files and never touches the cache.
//!
//! ## Usage
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let scanner = LibraryScanner::new(fs, "/music");
//! let mut scan = scanner.scan();
//! while let Some(file) = scan.next().await {
//!     println!("{}", file.relative_path.display());
//! }
//! println!("skipped {}", scan.stats().skipped());
//! ```

use crate::error::LibraryError;
use crate::models::{FileStamp, ScannedFile};
use bridge_traits::FileSystemAccess;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// Counters shared between a running [`Scan`] and its observers.
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    tracks: Arc<AtomicUsize>,
    skipped: Arc<AtomicUsize>,
}

impl ScanStats {
    /// Audio files yielded so far
    pub fn tracks(&self) -> usize {
        self.tracks.load(Ordering::Relaxed)
    }

    /// Entries that could not be read
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    fn record_track(&self) {
        self.tracks.fetch_add(1, Ordering::Relaxed);
    }

    fn record_skip(&self, error: &LibraryError) {
        warn!(error = %error, "Skipping unreadable library entry");
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }
}

/// A single lazy walk over the library.
pub struct Scan {
    inner: BoxStream<'static, ScannedFile>,
    stats: ScanStats,
}

impl Scan {
    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }
}

impl Stream for Scan {
    type Item = ScannedFile;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Library scanner bound to one root directory.
#[derive(Clone)]
pub struct LibraryScanner {
    fs: Arc<dyn FileSystemAccess>,
    root: PathBuf,
    extensions: Arc<[String]>,
}

struct WalkState {
    fs: Arc<dyn FileSystemAccess>,
    root: PathBuf,
    extensions: Arc<[String]>,
    /// Entries still to visit; the next one is at the end.
    stack: Vec<PathBuf>,
    stats: ScanStats,
}

impl LibraryScanner {
    /// Scanner accepting `mp3`, `flac` and `m4a`.
    pub fn new(fs: Arc<dyn FileSystemAccess>, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
            extensions: ["mp3", "flac", "m4a"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }

    /// Replace the extension allowlist. Matching is case-insensitive.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_audio_file(&self, path: &Path) -> bool {
        has_allowed_extension(&self.extensions, path)
    }

    /// Start a new walk of the library root.
    pub fn scan(&self) -> Scan {
        let stats = ScanStats::default();
        let state = WalkState {
            fs: Arc::clone(&self.fs),
            root: self.root.clone(),
            extensions: Arc::clone(&self.extensions),
            stack: vec![self.root.clone()],
            stats: stats.clone(),
        };

        debug!(root = %self.root.display(), "Starting library scan");
        let inner = stream::unfold(state, |mut state| async move {
            let next = state.next_file().await?;
            Some((next, state))
        })
        .boxed();

        Scan { inner, stats }
    }

    /// Drain a full walk.
    pub async fn scan_all(&self) -> (Vec<ScannedFile>, ScanStats) {
        let mut scan = self.scan();
        let mut files = Vec::new();
        while let Some(file) = scan.next().await {
            files.push(file);
        }
        let stats = scan.stats().clone();
        (files, stats)
    }
}

impl WalkState {
    async fn next_file(&mut self) -> Option<ScannedFile> {
        while let Some(path) = self.stack.pop() {
            let metadata = match self.fs.metadata(&path).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    self.stats.record_skip(&unreadable(&path, e));
                    continue;
                }
            };

            if metadata.is_directory {
                if metadata.is_symlink && path != self.root {
                    debug!(path = %path.display(), "Not following symlinked directory");
                    continue;
                }
                match self.fs.list_directory(&path).await {
                    Ok(mut entries) => {
                        // Reverse-sorted so that `pop` yields ascending order.
                        entries.sort_by(|a, b| b.cmp(a));
                        self.stack.extend(entries);
                    }
                    Err(e) => self.stats.record_skip(&unreadable(&path, e)),
                }
                continue;
            }

            if !has_allowed_extension(&self.extensions, &path) {
                continue;
            }

            self.stats.record_track();
            let stamp = FileStamp {
                size: metadata.size,
                modified_at: metadata.modified_at,
            };
            return Some(ScannedFile::new(&self.root, path, stamp));
        }

        debug!(
            tracks = self.stats.tracks(),
            skipped = self.stats.skipped(),
            "Library scan finished"
        );
        None
    }
}

fn unreadable(path: &Path, error: bridge_traits::BridgeError) -> LibraryError {
    LibraryError::FileUnreadable {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}

fn has_allowed_extension(extensions: &[String], path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
