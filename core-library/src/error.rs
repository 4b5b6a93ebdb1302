use bridge_traits::error::BridgeError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// An entry could not be read during a scan. Scans skip and count these.
    #[error("File unreadable: {path}: {message}")]
    FileUnreadable { path: PathBuf, message: String },

    #[error("Invalid track identity: {0:?}")]
    InvalidIdentity(String),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
