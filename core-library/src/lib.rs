//! # Library Module
//!
//! Track identity, descriptors and the filesystem scanner.
//!
//! ## Overview
//!
//! The library has no database: the directory tree under the music root is
//! the source of truth. This crate turns that tree into a lazy stream of
//! [`ScannedFile`]s keyed by [`TrackIdentity`], and defines the
//! [`TrackDescriptor`] the rest of the core passes around.

pub mod error;
pub mod models;
pub mod scanner;

pub use error::{LibraryError, Result};
pub use models::{
    FileStamp, ScannedFile, TrackDescriptor, TrackIdentity, TrackTags, UNKNOWN_ALBUM,
    UNKNOWN_ARTIST,
};
pub use scanner::{LibraryScanner, Scan, ScanStats};
