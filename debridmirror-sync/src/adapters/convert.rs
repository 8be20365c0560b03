//! Normalization helpers shared by the per-backend `convert` functions.

use crate::error::{MirrorResult, SyncError};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use debridmirror_types::MediaType;
use regex::Regex;
use std::sync::LazyLock;

static EPISODE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bs\d{1,2}[ ._-]?e\d{1,3}\b",
        r"(?i)\b\d{1,2}x\d{2,3}\b",
        r"(?i)\bseason[ ._-]?\d{1,2}\b",
        r"(?i)\bs\d{1,2}\b",
        r"(?i)\bcomplete[ ._-]series\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static YEAR_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9])(?:19|20)\d{2}(?:[^0-9]|$)").ok());

const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "wmv", "m4v", "ts", "webm", "mpg"];

/// Guesses the media type from a torrent name and its file paths.
///
/// Episode markers win over everything else; a release year or a video file
/// extension means a movie.
pub fn infer_media_type<'a>(filename: &str, paths: impl IntoIterator<Item = &'a str>) -> MediaType {
    let paths: Vec<&str> = paths.into_iter().collect();
    let is_episodic = |s: &str| EPISODE_PATTERNS.iter().any(|re| re.is_match(s));

    if is_episodic(filename) || paths.iter().any(|p| is_episodic(p)) {
        return MediaType::Tv;
    }

    let has_year = YEAR_PATTERN.as_ref().is_some_and(|re| re.is_match(filename));
    let is_video = |s: &str| {
        s.rsplit_once('.')
            .is_some_and(|(_, ext)| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    };
    if has_year || is_video(filename) || paths.iter().any(|p| is_video(p)) {
        return MediaType::Movie;
    }

    MediaType::Other
}

/// Lowercases and validates a 40-char hex info-hash.
pub fn normalize_hash(raw: &str) -> MirrorResult<String> {
    let hash = raw.trim().to_ascii_lowercase();
    if hash.len() != 40 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SyncError::Malformed(format!("invalid info-hash {raw:?}")));
    }
    Ok(hash)
}

/// Trims a link and encodes stray spaces.
pub fn normalize_link(raw: &str) -> String {
    raw.trim().replace(' ', "%20")
}

pub(crate) fn clamp_progress(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 100.0) }
}

/// Parses a backend timestamp without shifting it.
///
/// RFC 3339 strings keep their offset; offset-less strings are read as-is
/// with a zero offset.
pub(crate) fn parse_timestamp(raw: &str) -> MirrorResult<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc().fixed_offset());
        }
    }
    Err(SyncError::Malformed(format!("invalid timestamp {raw:?}")))
}

pub(crate) fn timestamp_from_unix(secs: i64) -> MirrorResult<DateTime<FixedOffset>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|ts| ts.fixed_offset())
        .ok_or_else(|| SyncError::Malformed(format!("invalid unix timestamp {secs}")))
}

/// Accepts byte counts sent as integers, floats, or numeric strings.
pub(crate) fn de_bytes<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct BytesVisitor;
    impl de::Visitor<'_> for BytesVisitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a byte count as number or string")
        }
        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }
        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            Ok(v.max(0) as u64)
        }
        fn visit_f64<E: de::Error>(self, v: f64) -> Result<u64, E> {
            Ok(if v.is_finite() && v > 0.0 { v.round() as u64 } else { 0 })
        }
        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            let v = v.trim();
            if let Ok(n) = v.parse::<u64>() {
                return Ok(n);
            }
            v.parse::<f64>()
                .map_err(de::Error::custom)
                .and_then(|f| self.visit_f64(f))
        }
        fn visit_unit<E: de::Error>(self) -> Result<u64, E> {
            Ok(0)
        }
    }
    deserializer.deserialize_any(BytesVisitor)
}
