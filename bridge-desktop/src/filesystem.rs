//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tracing::debug;

/// Tokio-based file system implementation
#[derive(Debug, Default, Clone)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    pub fn new() -> Self {
        Self
    }

    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(Self::map_io_error)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let link = fs::symlink_metadata(path).await.map_err(Self::map_io_error)?;
        let metadata = if link.file_type().is_symlink() {
            fs::metadata(path).await.map_err(Self::map_io_error)?
        } else {
            link.clone()
        };

        Ok(FileMetadata {
            size: metadata.len(),
            modified_at: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64),
            is_directory: metadata.is_dir(),
            is_symlink: link.file_type().is_symlink(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(Self::map_io_error)
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent).await?;
        }

        fs::write(path, data.as_ref())
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).await.map_err(Self::map_io_error)?;
        debug!(from = ?from, to = ?to, "Renamed file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path).await.map_err(Self::map_io_error)?;

        while let Some(entry) = read_dir.next_entry().await.map_err(Self::map_io_error)? {
            entries.push(entry.path());
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();
        let path = dir.path().join("nested").join("a.lrc");

        fs.write_file(&path, Bytes::from_static(b"lyrics")).await.unwrap();

        assert!(fs.exists(&path).await.unwrap());
        assert_eq!(fs.read_file(&path).await.unwrap(), Bytes::from_static(b"lyrics"));
        let meta = fs.metadata(&path).await.unwrap();
        assert_eq!(meta.size, 6);
        assert!(!meta.is_directory);
        assert!(meta.modified_at.is_some());
    }

    #[tokio::test]
    async fn test_atomic_write_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();
        let path = dir.path().join("covers").join("k.img");

        fs.write_file_atomic(&path, Bytes::from_static(b"old")).await.unwrap();
        fs.write_file_atomic(&path, Bytes::from_static(b"new")).await.unwrap();

        assert_eq!(fs.read_file(&path).await.unwrap(), Bytes::from_static(b"new"));
        let entries = fs.list_directory(&dir.path().join("covers")).await.unwrap();
        assert_eq!(entries, vec![path]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_metadata_flags_symlinked_directory() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();
        let link = dir.path().join("loop");
        std::os::unix::fs::symlink(dir.path(), &link).unwrap();

        let meta = fs.metadata(&link).await.unwrap();
        assert!(meta.is_directory);
        assert!(meta.is_symlink);

        let meta = fs.metadata(dir.path()).await.unwrap();
        assert!(!meta.is_symlink);
    }

    #[tokio::test]
    async fn test_missing_file_maps_to_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::new();

        let err = fs.read_file(&dir.path().join("missing")).await.unwrap_err();
        assert!(err.is_not_found());
        fs.remove_if_exists(&dir.path().join("missing")).await.unwrap();
    }
}
