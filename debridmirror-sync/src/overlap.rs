//! Incremental reuse of a previous full list.
//!
//! For a backend that lists newest-first in a stable order, a fresh first
//! page usually differs from the previous full list only in its head. If a
//! record in the fresh page is unchanged and sits at the same distance from
//! the logical end of the list as it did before, everything after it in the
//! old list is still valid and only the head needs to be replaced.
//!
//! The logical end of the fresh list is `ceil(total / page_size) * page_size`,
//! the total rounded up to a page boundary.

use crate::adapters::ServiceAdapter;
use crate::collect::{FetchContext, collect_parallel};
use crate::error::MirrorResult;
use debridmirror_types::{CanonicalTorrent, Credential, SyncResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Where a fresh head joins a reusable cached tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapBoundary {
    /// First index in the previous list that is reused.
    pub cached_index: usize,
    /// Number of fresh items that precede the reused tail.
    pub fresh_index: usize,
}

/// Same record, not modified since the previous list.
fn unchanged(cached: &CanonicalTorrent, fresh: &CanonicalTorrent) -> bool {
    cached.id == fresh.id
        && cached.progress == fresh.progress
        && cached.status == fresh.status
        && cached.service_status == fresh.service_status
}

/// Finds the overlap boundary between a previous full list and a fresh
/// first page.
///
/// Candidates are scanned by ascending cached index, then ascending fresh
/// index; the first pair whose distances from the logical end agree wins.
/// Returns `None` when the remote list shrank below the cached length, since
/// a reused tail would then contain removed records.
pub fn find_overlap(
    cached: &[CanonicalTorrent],
    fresh: &[CanonicalTorrent],
    total_count: usize,
    page_size: usize,
) -> Option<OverlapBoundary> {
    if cached.is_empty() || fresh.is_empty() || page_size == 0 || total_count < cached.len() {
        return None;
    }

    let expected_count = total_count.div_ceil(page_size) * page_size;

    for (cached_index, old) in cached.iter().enumerate() {
        for (fresh_index, new) in fresh.iter().enumerate() {
            if !unchanged(old, new) {
                continue;
            }
            let cached_from_end = cached.len() - 1 - cached_index;
            let Some(fresh_from_end) = (expected_count - 1).checked_sub(fresh_index) else {
                continue;
            };
            if cached_from_end == fresh_from_end {
                return Some(OverlapBoundary {
                    cached_index,
                    fresh_index,
                });
            }
        }
    }
    None
}

/// `fresh[..fresh_index] ++ cached[cached_index..]`.
pub fn splice(
    cached: &[CanonicalTorrent],
    fresh: &[CanonicalTorrent],
    boundary: OverlapBoundary,
) -> Vec<CanonicalTorrent> {
    let mut out = Vec::with_capacity(boundary.fresh_index + cached.len() - boundary.cached_index);
    out.extend_from_slice(&fresh[..boundary.fresh_index]);
    out.extend_from_slice(&cached[boundary.cached_index..]);
    out
}

struct PreviousList {
    torrents: Arc<Vec<CanonicalTorrent>>,
    recorded_at: Instant,
}

/// Holds the last full list per account and reuses it when possible.
pub struct OverlapCacheStrategy {
    max_age: Duration,
    previous: Mutex<HashMap<String, PreviousList>>,
}

impl OverlapCacheStrategy {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            previous: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the previous full list for `key`.
    pub async fn remember(&self, key: &str, torrents: Vec<CanonicalTorrent>) {
        self.previous.lock().await.insert(
            key.to_string(),
            PreviousList {
                torrents: Arc::new(torrents),
                recorded_at: Instant::now(),
            },
        );
    }

    pub async fn forget(&self, key: &str) {
        self.previous.lock().await.remove(key);
    }

    /// The previous list for `key`, if it is recent enough to reuse.
    async fn usable_previous(&self, key: &str) -> Option<Arc<Vec<CanonicalTorrent>>> {
        let previous = self.previous.lock().await;
        let entry = previous.get(key)?;
        if entry.recorded_at.elapsed() > self.max_age || entry.torrents.is_empty() {
            return None;
        }
        Some(entry.torrents.clone())
    }

    /// Syncs a paged, total-reporting backend, reusing the previous list's
    /// tail when an overlap boundary exists and falling back to a full
    /// parallel fetch otherwise.
    pub async fn sync(
        &self,
        key: &str,
        adapter: &dyn ServiceAdapter,
        credential: &Credential,
        page_size: usize,
        ctx: &FetchContext,
    ) -> MirrorResult<SyncResult> {
        let tag = adapter.tag();
        let Some(cached) = self.usable_previous(key).await else {
            debug!("{tag}: no reusable previous list, full fetch");
            let collected = collect_parallel(adapter, credential, page_size, None, ctx).await?;
            self.record(key, &collected.torrents, ctx).await;
            return Ok(SyncResult::new(collected.torrents, collected.total_count, false));
        };

        ctx.checkpoint()?;
        let first = adapter.fetch_first_page(credential, page_size, &ctx.cancel).await?;
        ctx.checkpoint()?;
        let total_count = first.total_count.unwrap_or(first.raw_len());

        // Positions are measured from the end of the remote list, so a record
        // dropped during conversion would shift every fresh index.
        let boundary = if first.skipped == 0 {
            find_overlap(&cached, &first.items, total_count, page_size)
        } else {
            debug!("{tag}: {} records skipped on the first page", first.skipped);
            None
        };

        if let Some(boundary) = boundary {
            let mut torrents = splice(&cached, &first.items, boundary);
            debug!(
                "{tag}: overlap at cached {} / fresh {}, reused {} items",
                boundary.cached_index,
                boundary.fresh_index,
                cached.len() - boundary.cached_index
            );
            self.record(key, &torrents, ctx).await;
            if let Some(max) = ctx.max_items {
                torrents.truncate(max);
            }
            ctx.batch(&torrents);
            ctx.progress(torrents.len(), torrents.len());
            return Ok(SyncResult::new(torrents, total_count, true));
        }

        debug!("{tag}: no overlap boundary, full fetch");
        let collected = collect_parallel(adapter, credential, page_size, Some(first), ctx).await?;
        self.record(key, &collected.torrents, ctx).await;
        Ok(SyncResult::new(collected.torrents, collected.total_count, false))
    }

    /// Only untruncated lists are complete enough to reuse later.
    async fn record(&self, key: &str, torrents: &[CanonicalTorrent], ctx: &FetchContext) {
        if ctx.max_items.is_none() {
            self.remember(key, torrents.to_vec()).await;
        }
    }
}
