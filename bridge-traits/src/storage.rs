//! Storage and File System Abstractions
//!
//! The library tree and the enrichment cache are both plain directories, so
//! this trait is the only persistence seam the core needs.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, Result};

/// File metadata information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    /// Last modification time as Unix milliseconds
    pub modified_at: Option<i64>,
    /// Describes the link target when `is_symlink` is set
    pub is_directory: bool,
    /// The path itself is a symbolic link
    pub is_symlink: bool,
}

/// File system access trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn publish(fs: &dyn FileSystemAccess, dir: &Path, data: Bytes) -> Result<()> {
///     fs.write_file_atomic(&dir.join("entry.lrc"), data).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory, following symbolic links
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Rename `from` to `to`, replacing `to` if it exists.
    ///
    /// Must be atomic when both paths are on the same filesystem.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Write `data` to a uniquely named sibling temp file, then rename it over
    /// `path`. Readers observe either the previous content or the new content.
    async fn write_file_atomic(&self, path: &Path, data: Bytes) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                BridgeError::OperationFailed(format!("Invalid target path: {}", path.display()))
            })?;
        let temp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        self.write_file(&temp, data).await?;
        if let Err(e) = self.rename(&temp, path).await {
            let _ = self.delete_file(&temp).await;
            return Err(e);
        }
        Ok(())
    }

    /// Delete a file, treating a missing file as success
    async fn remove_if_exists(&self, path: &Path) -> Result<()> {
        match self.delete_file(path).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }
}

/// True for temp files produced by [`FileSystemAccess::write_file_atomic`].
pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') && n.ends_with(".tmp"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryFs {
        files: Mutex<HashMap<PathBuf, Bytes>>,
        fail_rename: bool,
    }

    #[async_trait]
    impl FileSystemAccess for MemoryFs {
        async fn exists(&self, path: &Path) -> Result<bool> {
            Ok(self.files.lock().unwrap().contains_key(path))
        }

        async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
            let files = self.files.lock().unwrap();
            let data = files
                .get(path)
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))?;
            Ok(FileMetadata {
                size: data.len() as u64,
                modified_at: None,
                ..Default::default()
            })
        }

        async fn create_dir_all(&self, _path: &Path) -> Result<()> {
            Ok(())
        }

        async fn read_file(&self, path: &Path) -> Result<Bytes> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound).into())
        }

        async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
            self.files.lock().unwrap().insert(path.to_path_buf(), data);
            Ok(())
        }

        async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
            if self.fail_rename {
                return Err(BridgeError::OperationFailed("rename refused".to_string()));
            }
            let mut files = self.files.lock().unwrap();
            let data = files
                .remove(from)
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))?;
            files.insert(to.to_path_buf(), data);
            Ok(())
        }

        async fn delete_file(&self, path: &Path) -> Result<()> {
            self.files
                .lock()
                .unwrap()
                .remove(path)
                .map(|_| ())
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound).into())
        }

        async fn list_directory(&self, _path: &Path) -> Result<Vec<PathBuf>> {
            Ok(self.files.lock().unwrap().keys().cloned().collect())
        }
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_only_target() {
        let fs = MemoryFs::default();
        let target = Path::new("/cache/lyrics/abc.lrc");

        fs.write_file_atomic(target, Bytes::from_static(b"[00:01.00]hi"))
            .await
            .unwrap();

        let files = fs.list_directory(Path::new("/cache")).await.unwrap();
        assert_eq!(files, vec![target.to_path_buf()]);
        assert_eq!(
            fs.read_file(target).await.unwrap(),
            Bytes::from_static(b"[00:01.00]hi")
        );
    }

    #[tokio::test]
    async fn test_failed_rename_cleans_temp_file() {
        let fs = MemoryFs {
            fail_rename: true,
            ..Default::default()
        };
        let target = Path::new("/cache/covers/abc.img");

        let result = fs.write_file_atomic(target, Bytes::from_static(b"img")).await;

        assert!(result.is_err());
        assert!(fs.files.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_if_exists_ignores_missing() {
        let fs = MemoryFs::default();
        fs.remove_if_exists(Path::new("/nope")).await.unwrap();
    }

    #[test]
    fn test_temp_file_detection() {
        assert!(is_temp_file(Path::new("/c/.abc.lrc.1234.tmp")));
        assert!(!is_temp_file(Path::new("/c/abc.lrc")));
    }
}
