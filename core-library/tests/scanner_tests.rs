//! Scanner tests against a real temporary directory tree

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{FileMetadata, FileSystemAccess};
use bytes::Bytes;
use core_library::{LibraryScanner, TrackIdentity};
use futures::StreamExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn library() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("B Artist/Album")).unwrap();
    fs::create_dir_all(root.join("A Artist")).unwrap();
    fs::create_dir_all(root.join("empty")).unwrap();

    fs::write(root.join("A Artist/one.mp3"), b"mp3-one").unwrap();
    fs::write(root.join("A Artist/one.lrc"), b"[00:01.00]line").unwrap();
    fs::write(root.join("A Artist/cover.jpg"), b"jpg").unwrap();
    fs::write(root.join("B Artist/Album/02.FLAC"), b"flac").unwrap();
    fs::write(root.join("B Artist/Album/01.m4a"), b"m4a").unwrap();
    fs::write(root.join("notes.txt"), b"txt").unwrap();
    fs::write(root.join("top.mp3"), b"top").unwrap();
    dir
}

fn relative_names(files: &[core_library::ScannedFile]) -> Vec<String> {
    files
        .iter()
        .map(|f| f.relative_path.to_string_lossy().replace('\\', "/"))
        .collect()
}

#[tokio::test]
async fn test_scan_yields_audio_files_in_sorted_order() {
    let dir = library();
    let scanner = LibraryScanner::new(Arc::new(TokioFileSystem::new()), dir.path());

    let (files, stats) = scanner.scan_all().await;

    assert_eq!(
        relative_names(&files),
        vec![
            "A Artist/one.mp3",
            "B Artist/Album/01.m4a",
            "B Artist/Album/02.FLAC",
            "top.mp3",
        ]
    );
    assert_eq!(stats.tracks(), 4);
    assert_eq!(stats.skipped(), 0);
    assert_eq!(files[0].stamp.size, 7);
    assert!(files[0].stamp.modified_at.is_some());
}

#[tokio::test]
async fn test_scan_is_restartable_and_stable() {
    let dir = library();
    let scanner = LibraryScanner::new(Arc::new(TokioFileSystem::new()), dir.path());

    let (first, _) = scanner.scan_all().await;
    let (second, _) = scanner.scan_all().await;

    let ids = |files: &[core_library::ScannedFile]| -> Vec<TrackIdentity> {
        files.iter().map(|f| f.identity.clone()).collect()
    };
    assert_eq!(ids(&first), ids(&second));
}

#[tokio::test]
async fn test_scan_is_lazy() {
    let dir = library();
    let scanner = LibraryScanner::new(Arc::new(TokioFileSystem::new()), dir.path());

    let mut scan = scanner.scan();
    let first = scan.next().await.unwrap();

    assert!(first.path.ends_with("one.mp3"));
    assert_eq!(scan.stats().tracks(), 1);
}

#[tokio::test]
async fn test_custom_extension_allowlist() {
    let dir = library();
    fs::write(dir.path().join("x.ogg"), b"ogg").unwrap();
    let scanner = LibraryScanner::new(Arc::new(TokioFileSystem::new()), dir.path())
        .with_extensions(["ogg", ".MP3"]);

    let (files, _) = scanner.scan_all().await;

    assert_eq!(
        relative_names(&files),
        vec!["A Artist/one.mp3", "top.mp3", "x.ogg"]
    );
}

#[tokio::test]
async fn test_missing_root_counts_one_skip() {
    let dir = tempfile::tempdir().unwrap();
    let scanner = LibraryScanner::new(
        Arc::new(TokioFileSystem::new()),
        dir.path().join("does-not-exist"),
    );

    let (files, stats) = scanner.scan_all().await;

    assert!(files.is_empty());
    assert_eq!(stats.skipped(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_cycles_are_not_followed() {
    let dir = library();
    let root = dir.path();
    std::os::unix::fs::symlink(root, root.join("loop")).unwrap();
    std::os::unix::fs::symlink(root.join("B Artist"), root.join("A Artist/again")).unwrap();
    std::os::unix::fs::symlink(root.join("top.mp3"), root.join("linked.mp3")).unwrap();
    let scanner = LibraryScanner::new(Arc::new(TokioFileSystem::new()), root);

    let (files, stats) = scanner.scan_all().await;

    assert_eq!(
        relative_names(&files),
        vec![
            "A Artist/one.mp3",
            "B Artist/Album/01.m4a",
            "B Artist/Album/02.FLAC",
            "linked.mp3",
            "top.mp3",
        ]
    );
    assert_eq!(stats.skipped(), 0);
}

/// Delegates to the real filesystem but fails for chosen paths.
struct FlakyFs {
    inner: TokioFileSystem,
    broken: Vec<PathBuf>,
}

impl FlakyFs {
    fn check(&self, path: &Path) -> BridgeResult<()> {
        if self.broken.iter().any(|b| b == path) {
            return Err(BridgeError::OperationFailed("permission denied".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystemAccess for FlakyFs {
    async fn exists(&self, path: &Path) -> BridgeResult<bool> {
        self.inner.exists(path).await
    }
    async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata> {
        self.check(path)?;
        self.inner.metadata(path).await
    }
    async fn create_dir_all(&self, path: &Path) -> BridgeResult<()> {
        self.inner.create_dir_all(path).await
    }
    async fn read_file(&self, path: &Path) -> BridgeResult<Bytes> {
        self.check(path)?;
        self.inner.read_file(path).await
    }
    async fn write_file(&self, path: &Path, data: Bytes) -> BridgeResult<()> {
        self.inner.write_file(path, data).await
    }
    async fn rename(&self, from: &Path, to: &Path) -> BridgeResult<()> {
        self.inner.rename(from, to).await
    }
    async fn delete_file(&self, path: &Path) -> BridgeResult<()> {
        self.inner.delete_file(path).await
    }
    async fn list_directory(&self, path: &Path) -> BridgeResult<Vec<PathBuf>> {
        self.inner.list_directory(path).await
    }
}

#[tokio::test]
async fn test_unreadable_entries_are_skipped_and_counted() {
    let dir = library();
    let fs = FlakyFs {
        inner: TokioFileSystem::new(),
        broken: vec![
            dir.path().join("A Artist/one.mp3"),
            dir.path().join("B Artist"),
        ],
    };
    let scanner = LibraryScanner::new(Arc::new(fs), dir.path());

    let (files, stats) = scanner.scan_all().await;

    assert_eq!(relative_names(&files), vec!["top.mp3"]);
    assert_eq!(stats.skipped(), 2);
    assert_eq!(stats.tracks(), 1);
}
