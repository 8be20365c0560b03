//! Content signatures for change detection.
//!
//! A signature is the SHA-256 of a stable JSON serialization of the record.
//! Timestamps are rendered in UTC with millisecond precision before hashing so
//! that `2024-05-01T12:00:00+02:00` and `2024-05-01T10:00:00Z` sign the same.

use crate::torrent::{CanonicalTorrent, MediaType, SelectedFile, TorrentStatus};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a record.
pub type Signature = String;

#[derive(Serialize)]
struct SignedView<'a> {
    id: &'a str,
    hash: &'a str,
    filename: &'a str,
    bytes: u64,
    media_type: MediaType,
    status: TorrentStatus,
    service_status: &'a str,
    progress: f64,
    added_at: String,
    seeders: u32,
    speed: u64,
    links: &'a [String],
    selected_files: &'a [SelectedFile],
}

/// Computes the content signature of a torrent.
pub fn signature(torrent: &CanonicalTorrent) -> Signature {
    let view = SignedView {
        id: &torrent.id,
        hash: &torrent.hash,
        filename: &torrent.filename,
        bytes: torrent.bytes,
        media_type: torrent.media_type,
        status: torrent.status,
        service_status: &torrent.service_status,
        progress: torrent.progress,
        added_at: torrent
            .added_at
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        seeders: torrent.seeders,
        speed: torrent.speed,
        links: &torrent.links,
        selected_files: &torrent.selected_files,
    };
    // Plain structs of strings and numbers always serialize.
    let bytes = serde_json::to_vec(&view).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}
