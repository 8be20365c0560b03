//! The canonical torrent record.

use crate::service::ServiceTag;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of media a torrent most likely holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
    Other,
}

/// Backend-agnostic download state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TorrentStatus {
    Waiting,
    Downloading,
    Finished,
    Error,
}

impl fmt::Display for TorrentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentStatus::Waiting => write!(f, "waiting"),
            TorrentStatus::Downloading => write!(f, "downloading"),
            TorrentStatus::Finished => write!(f, "finished"),
            TorrentStatus::Error => write!(f, "error"),
        }
    }
}

/// A file the user selected inside a torrent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedFile {
    pub id: u64,
    pub path: String,
    pub bytes: u64,
}

/// One remote torrent, as mirrored locally.
///
/// `id` is `<serviceTag>:<nativeId>` and stays stable for the lifetime of the
/// remote record. A re-added torrent gets a new native id and therefore a new
/// `CanonicalTorrent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTorrent {
    pub id: String,
    /// Lowercase 40-char hex info-hash.
    pub hash: String,
    pub filename: String,
    pub bytes: u64,
    pub media_type: MediaType,
    pub status: TorrentStatus,
    /// Raw backend status string, kept for diagnostics.
    pub service_status: String,
    /// 0 to 100.
    pub progress: f64,
    /// As reported by the backend, offset included.
    pub added_at: DateTime<FixedOffset>,
    pub seeders: u32,
    /// Bytes per second.
    pub speed: u64,
    pub links: Vec<String>,
    pub selected_files: Vec<SelectedFile>,
}

impl CanonicalTorrent {
    /// The service this record was mirrored from, read from the id prefix.
    pub fn service(&self) -> Option<ServiceTag> {
        self.id.split_once(':').and_then(|(tag, _)| tag.parse().ok())
    }

    /// The backend's own id, without the service prefix.
    pub fn native_id(&self) -> &str {
        self.id.split_once(':').map_or(self.id.as_str(), |(_, native)| native)
    }
}

/// Builds the composite mirror id for a backend record.
pub fn compose_id(tag: ServiceTag, native_id: impl fmt::Display) -> String {
    format!("{tag}:{native_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_id_splits_back() {
        let id = compose_id(ServiceTag::C, 4412);
        assert_eq!(id, "svc-c:4412");

        let t = CanonicalTorrent {
            id,
            hash: "a".repeat(40),
            filename: "x".into(),
            bytes: 0,
            media_type: MediaType::Other,
            status: TorrentStatus::Waiting,
            service_status: "queued".into(),
            progress: 0.0,
            added_at: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap(),
            seeders: 0,
            speed: 0,
            links: vec![],
            selected_files: vec![],
        };
        assert_eq!(t.service(), Some(ServiceTag::C));
        assert_eq!(t.native_id(), "4412");
    }

    #[test]
    fn native_id_may_contain_colons() {
        let id = compose_id(ServiceTag::A, "ABC:DEF");
        assert_eq!(id.split_once(':').unwrap().1, "ABC:DEF");
    }
}
