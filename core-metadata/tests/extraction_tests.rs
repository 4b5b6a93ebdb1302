//! Integration tests for the local metadata reader
//!
//! Audio files are synthesised on the fly: an ID3v2.4 tag followed by a few
//! silent MPEG-1 Layer III frames.

use bridge_desktop::TokioFileSystem;
use core_metadata::{LocalMetadataReader, MetadataError, TagStatus};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const PNG: [u8; 16] = [
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13, b'I', b'H', b'D', b'R',
];

fn syncsafe(size: usize) -> [u8; 4] {
    [
        ((size >> 21) & 0x7F) as u8,
        ((size >> 14) & 0x7F) as u8,
        ((size >> 7) & 0x7F) as u8,
        (size & 0x7F) as u8,
    ]
}

fn frame(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    out.extend_from_slice(&syncsafe(body.len()));
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(body);
    out
}

fn text_frame(id: &[u8; 4], text: &str) -> Vec<u8> {
    let mut body = vec![0x03];
    body.extend_from_slice(text.as_bytes());
    frame(id, &body)
}

fn picture_frame() -> Vec<u8> {
    let mut body = vec![0x00];
    body.extend_from_slice(b"image/png\0");
    body.push(0x03);
    body.push(0x00);
    body.extend_from_slice(&PNG);
    frame(b"APIC", &body)
}

fn mp3(title: &str, artist: &str, with_cover: bool) -> Vec<u8> {
    let mut frames = text_frame(b"TIT2", title);
    frames.extend(text_frame(b"TPE1", artist));
    if with_cover {
        frames.extend(picture_frame());
    }

    let mut out = b"ID3".to_vec();
    out.extend_from_slice(&[4, 0, 0]);
    out.extend_from_slice(&syncsafe(frames.len()));
    out.extend(frames);

    // 128 kbps, 44.1 kHz, no padding: 417 bytes per frame.
    for _ in 0..4 {
        let mut audio = vec![0u8; 417];
        audio[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        out.extend(audio);
    }
    out
}

fn reader() -> LocalMetadataReader {
    LocalMetadataReader::new(Arc::new(TokioFileSystem::new()))
}

#[tokio::test]
async fn test_reads_tags_and_embedded_cover() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("track.mp3");
    fs::write(&path, mp3("Hey Jude", "The Beatles", true)).unwrap();

    let local = reader().read_local(&path).await.unwrap();

    assert_eq!(local.tag_status, TagStatus::Parsed);
    assert_eq!(local.tags.title.as_deref(), Some("Hey Jude"));
    assert_eq!(local.tags.artist.as_deref(), Some("The Beatles"));
    assert_eq!(local.tags.album, None);

    let cover = local.embedded_cover.as_ref().unwrap();
    assert_eq!(cover.mime_type, "image/png");
    assert_eq!(cover.data.as_ref(), &PNG);
    assert!(local.availability().cover);

    let cover = reader().read_embedded_cover(&path).await.unwrap().unwrap();
    assert_eq!(cover.mime_type, "image/png");
}

#[tokio::test]
async fn test_sidecar_lyrics_are_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("song.mp3");
    fs::write(&path, mp3("Song", "Artist", false)).unwrap();
    fs::write(dir.path().join("song.lrc"), "[00:01.00]first line").unwrap();

    let local = reader().read_local(&path).await.unwrap();

    assert_eq!(local.sidecar_lyrics.as_deref(), Some("[00:01.00]first line"));
    assert_eq!(local.lyrics(), Some("[00:01.00]first line"));
    assert!(local.embedded_cover.is_none());
    assert!(!local.availability().cover);
}

#[tokio::test]
async fn test_sidecar_is_decoded_lossily() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("song.mp3");
    fs::write(&path, mp3("Song", "Artist", false)).unwrap();
    fs::write(dir.path().join("song.lrc"), b"caf\xE9 line").unwrap();

    let local = reader().read_local(&path).await.unwrap();

    let lyrics = local.lyrics().unwrap();
    assert!(lyrics.starts_with("caf"));
    assert!(lyrics.ends_with(" line"));
}

#[tokio::test]
async fn test_blank_sidecar_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("song.mp3");
    fs::write(&path, mp3("Song", "Artist", false)).unwrap();
    fs::write(dir.path().join("song.lrc"), "  \n").unwrap();

    let local = reader().read_local(&path).await.unwrap();

    assert!(local.lyrics().is_none());
}

#[tokio::test]
async fn test_corrupt_file_degrades_to_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("My  Song.mp3");
    fs::write(&path, b"This is not a valid audio file").unwrap();
    fs::write(dir.path().join("My  Song.lrc"), "[00:02.00]still here").unwrap();

    let local = reader().read_local(&path).await.unwrap();

    assert_eq!(local.tag_status, TagStatus::Corrupt);
    assert_eq!(local.tags.title.as_deref(), Some("My Song"));
    assert_eq!(local.tags.artist, None);
    assert_eq!(local.lyrics(), Some("[00:02.00]still here"));

    assert!(reader().read_embedded_cover(&path).await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_file_is_unreadable() {
    let result = reader()
        .read_local(Path::new("/definitely/not/here.mp3"))
        .await;

    assert!(matches!(result, Err(MetadataError::FileUnreadable { .. })));
}
