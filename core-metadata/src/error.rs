use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Corrupt tag container in {path}: {message}")]
    TagCorrupt { path: PathBuf, message: String },

    #[error("Cannot read {path}: {message}")]
    FileUnreadable { path: PathBuf, message: String },

    #[error("Remote request timed out after {0:?}")]
    RemoteTimeout(Duration),

    #[error("Remote source unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Cache write failed for {key}: {message}")]
    CacheWrite { key: String, message: String },

    #[error("Invalid cache entry: {0}")]
    InvalidCacheEntry(String),

    #[error("Coordinator is shut down")]
    ShutDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),
}

pub type Result<T> = std::result::Result<T, MetadataError>;
