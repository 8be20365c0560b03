//! Result of one library sync.

use crate::torrent::CanonicalTorrent;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The mirrored collection of one service, as returned by a sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub torrents: Vec<CanonicalTorrent>,
    pub total_count: usize,
    /// True when the list came from the cache, in whole or via overlap reuse.
    pub cache_hit: bool,
}

impl SyncResult {
    pub fn new(torrents: Vec<CanonicalTorrent>, total_count: usize, cache_hit: bool) -> Self {
        Self {
            torrents,
            total_count,
            cache_hit,
        }
    }

    /// Merges several results into one list, keeping the first record seen
    /// for any id. Order follows the input order.
    pub fn union<'a>(results: impl IntoIterator<Item = &'a SyncResult>) -> Vec<CanonicalTorrent> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for result in results {
            for torrent in &result.torrents {
                if seen.insert(torrent.id.clone()) {
                    merged.push(torrent.clone());
                }
            }
        }
        merged
    }
}
