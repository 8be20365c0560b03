//! Raw backend payloads and their conversion into canonical records.
//!
//! One struct per backend. Each adapter deserializes its own type and wraps
//! it in the matching [`RawTorrent`] variant, so no payload is ever sniffed
//! at runtime.

use super::convert::{
    clamp_progress, de_bytes, infer_media_type, normalize_hash, normalize_link, parse_timestamp,
    timestamp_from_unix,
};
use crate::error::MirrorResult;
use debridmirror_types::{
    CanonicalTorrent, SelectedFile, ServiceTag, TorrentStatus, compose_id,
};
use super::Page;
use serde::Deserialize;
use tracing::warn;

/// A raw record from any backend.
#[derive(Debug, Clone)]
pub enum RawTorrent {
    A(RawA),
    B(RawB),
    C(RawC),
}

impl RawTorrent {
    pub fn tag(&self) -> ServiceTag {
        match self {
            RawTorrent::A(_) => ServiceTag::A,
            RawTorrent::B(_) => ServiceTag::B,
            RawTorrent::C(_) => ServiceTag::C,
        }
    }

    /// The backend's own id, for logging.
    pub fn native_id(&self) -> String {
        match self {
            RawTorrent::A(raw) => raw.id.clone(),
            RawTorrent::B(raw) => raw.id.to_string(),
            RawTorrent::C(raw) => raw.id.to_string(),
        }
    }

    pub fn convert(self) -> MirrorResult<CanonicalTorrent> {
        match self {
            RawTorrent::A(raw) => raw.convert(),
            RawTorrent::B(raw) => raw.convert(),
            RawTorrent::C(raw) => raw.convert(),
        }
    }
}

/// Converts one response. Records that fail to convert are logged and
/// counted in [`Page::skipped`].
pub fn convert_page(
    raws: impl IntoIterator<Item = RawTorrent>,
    total_count: Option<usize>,
) -> Page {
    let mut page = Page::new(Vec::new(), total_count);
    for raw in raws {
        let tag = raw.tag();
        let id = raw.native_id();
        match raw.convert() {
            Ok(torrent) => page.items.push(torrent),
            Err(e) => {
                warn!("{tag}: skipping torrent {id}: {e}");
                page.skipped += 1;
            }
        }
    }
    page
}

// ── Service A ──

#[derive(Debug, Clone, Deserialize)]
pub struct RawAFile {
    pub id: u64,
    pub path: String,
    #[serde(deserialize_with = "de_bytes")]
    pub bytes: u64,
    #[serde(default)]
    pub selected: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawA {
    pub id: String,
    pub filename: String,
    pub hash: String,
    #[serde(deserialize_with = "de_bytes")]
    pub bytes: u64,
    pub status: String,
    #[serde(default)]
    pub progress: f64,
    pub added: String,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub seeders: Option<u32>,
    #[serde(default)]
    pub speed: Option<u64>,
    #[serde(default)]
    pub files: Vec<RawAFile>,
}

impl RawA {
    pub fn status(raw: &str) -> TorrentStatus {
        match raw {
            "magnet_error" | "error" | "virus" | "dead" => TorrentStatus::Error,
            "downloaded" => TorrentStatus::Finished,
            "downloading" | "compressing" | "uploading" => TorrentStatus::Downloading,
            _ => TorrentStatus::Waiting,
        }
    }

    pub fn convert(self) -> MirrorResult<CanonicalTorrent> {
        let selected_files: Vec<SelectedFile> = self
            .files
            .into_iter()
            .filter(|f| f.selected == 1)
            .map(|f| SelectedFile {
                id: f.id,
                path: f.path,
                bytes: f.bytes,
            })
            .collect();
        let media_type = infer_media_type(&self.filename, selected_files.iter().map(|f| f.path.as_str()));

        Ok(CanonicalTorrent {
            id: compose_id(ServiceTag::A, &self.id),
            hash: normalize_hash(&self.hash)?,
            media_type,
            status: Self::status(&self.status),
            service_status: self.status,
            progress: clamp_progress(self.progress),
            added_at: parse_timestamp(&self.added)?,
            seeders: self.seeders.unwrap_or(0),
            speed: self.speed.unwrap_or(0),
            links: self.links.iter().map(|l| normalize_link(l)).collect(),
            selected_files,
            filename: self.filename,
            bytes: self.bytes,
        })
    }
}

// ── Service B ──

#[derive(Debug, Clone, Deserialize)]
pub struct RawBLink {
    pub link: String,
    pub filename: String,
    #[serde(deserialize_with = "de_bytes", default)]
    pub size: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawB {
    pub id: u64,
    pub filename: String,
    pub hash: String,
    #[serde(deserialize_with = "de_bytes")]
    pub size: u64,
    pub status: String,
    pub status_code: i32,
    #[serde(deserialize_with = "de_bytes", default)]
    pub downloaded: u64,
    pub upload_date: i64,
    #[serde(default)]
    pub seeders: u32,
    #[serde(deserialize_with = "de_bytes", default)]
    pub download_speed: u64,
    #[serde(default)]
    pub links: Vec<RawBLink>,
}

impl RawB {
    pub fn status(code: i32) -> TorrentStatus {
        match code {
            0 => TorrentStatus::Waiting,
            1..=3 => TorrentStatus::Downloading,
            4 => TorrentStatus::Finished,
            c if c >= 5 => TorrentStatus::Error,
            _ => TorrentStatus::Waiting,
        }
    }

    pub fn convert(self) -> MirrorResult<CanonicalTorrent> {
        let status = Self::status(self.status_code);
        let progress = if status == TorrentStatus::Finished {
            100.0
        } else if self.size > 0 {
            clamp_progress(self.downloaded as f64 / self.size as f64 * 100.0)
        } else {
            0.0
        };
        let selected_files: Vec<SelectedFile> = self
            .links
            .iter()
            .enumerate()
            .map(|(i, l)| SelectedFile {
                id: i as u64,
                path: l.filename.clone(),
                bytes: l.size,
            })
            .collect();
        let media_type = infer_media_type(&self.filename, selected_files.iter().map(|f| f.path.as_str()));

        Ok(CanonicalTorrent {
            id: compose_id(ServiceTag::B, self.id),
            hash: normalize_hash(&self.hash)?,
            media_type,
            status,
            service_status: self.status,
            progress,
            added_at: timestamp_from_unix(self.upload_date)?,
            seeders: self.seeders,
            speed: self.download_speed,
            links: self.links.iter().map(|l| normalize_link(&l.link)).collect(),
            selected_files,
            filename: self.filename,
            bytes: self.size,
        })
    }
}

// ── Service C ──

#[derive(Debug, Clone, Deserialize)]
pub struct RawCFile {
    pub id: u64,
    pub name: String,
    #[serde(deserialize_with = "de_bytes")]
    pub size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawC {
    pub id: u64,
    pub hash: String,
    pub name: String,
    #[serde(deserialize_with = "de_bytes")]
    pub size: u64,
    /// Fraction, 0 to 1.
    #[serde(default)]
    pub progress: f64,
    pub download_state: String,
    #[serde(default)]
    pub download_finished: bool,
    pub created_at: String,
    #[serde(default)]
    pub seeds: u32,
    #[serde(deserialize_with = "de_bytes", default)]
    pub download_speed: u64,
    #[serde(default)]
    pub files: Vec<RawCFile>,
    #[serde(default)]
    pub links: Vec<String>,
}

impl RawC {
    pub fn status(state: &str, finished: bool) -> TorrentStatus {
        if finished {
            return TorrentStatus::Finished;
        }
        match state {
            "completed" | "cached" | "uploading" | "seeding" => TorrentStatus::Finished,
            "downloading" | "metaDL" | "checkingResumeData" => TorrentStatus::Downloading,
            "error" | "stalled (no seeds)" => TorrentStatus::Error,
            s if s.starts_with("failed") => TorrentStatus::Error,
            _ => TorrentStatus::Waiting,
        }
    }

    pub fn convert(self) -> MirrorResult<CanonicalTorrent> {
        let status = Self::status(&self.download_state, self.download_finished);
        let progress = if status == TorrentStatus::Finished {
            100.0
        } else {
            clamp_progress(self.progress * 100.0)
        };
        let selected_files: Vec<SelectedFile> = self
            .files
            .into_iter()
            .map(|f| SelectedFile {
                id: f.id,
                path: f.name,
                bytes: f.size,
            })
            .collect();
        let media_type = infer_media_type(&self.name, selected_files.iter().map(|f| f.path.as_str()));

        Ok(CanonicalTorrent {
            id: compose_id(ServiceTag::C, self.id),
            hash: normalize_hash(&self.hash)?,
            media_type,
            status,
            service_status: self.download_state,
            progress,
            added_at: parse_timestamp(&self.created_at)?,
            seeders: self.seeds,
            speed: self.download_speed,
            links: self.links.iter().map(|l| normalize_link(l)).collect(),
            selected_files,
            filename: self.name,
            bytes: self.size,
        })
    }
}
