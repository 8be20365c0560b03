//! Page-walking drivers for the three [`Paging`] strategies.
//!
//! Cancellation is checked before every page request is dispatched. Requests
//! already in flight finish, but once the token fires the whole collection is
//! discarded and `SyncError::Cancelled` is returned.

use crate::adapters::{Page, Paging, ServiceAdapter};
use crate::error::{MirrorResult, SyncError};
use debridmirror_types::{CanonicalTorrent, Credential};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Called with `(done, total)` as items arrive. `total` is a best guess for
/// backends that do not report one.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Called with each batch of converted items as it arrives.
pub type BatchCallback = Arc<dyn Fn(&[CanonicalTorrent]) + Send + Sync>;

/// Sequential walks give up after this many failed pages in a row.
pub const MAX_CONSECUTIVE_PAGE_FAILURES: usize = 3;

/// Everything a driver needs besides the adapter and credential.
#[derive(Clone, Default)]
pub struct FetchContext {
    pub concurrency: usize,
    pub max_items: Option<usize>,
    pub on_progress: Option<ProgressCallback>,
    pub on_batch: Option<BatchCallback>,
    /// Never fires unless the caller supplied a signal.
    pub cancel: CancellationToken,
}

impl fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchContext")
            .field("concurrency", &self.concurrency)
            .field("max_items", &self.max_items)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_batch", &self.on_batch.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl FetchContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns `Err(Cancelled)` if the token has fired.
    pub fn checkpoint(&self) -> MirrorResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn progress(&self, done: usize, total: usize) {
        if let Some(cb) = &self.on_progress {
            cb(done, total);
        }
    }

    pub fn batch(&self, items: &[CanonicalTorrent]) {
        if let Some(cb) = &self.on_batch {
            if !items.is_empty() {
                cb(items);
            }
        }
    }

    fn cap(&self, total: usize) -> usize {
        self.max_items.map_or(total, |max| total.min(max))
    }
}

/// A fully collected list.
#[derive(Debug, Clone)]
pub struct Collected {
    pub torrents: Vec<CanonicalTorrent>,
    pub total_count: usize,
}

/// Walks the adapter's collection with its declared strategy.
pub async fn collect(
    adapter: &dyn ServiceAdapter,
    credential: &Credential,
    ctx: &FetchContext,
) -> MirrorResult<Collected> {
    ctx.checkpoint()?;
    match adapter.paging() {
        Paging::Parallel { page_size } => collect_parallel(adapter, credential, page_size, None, ctx).await,
        Paging::SingleShot { chunk_size } => collect_single_shot(adapter, credential, chunk_size, ctx).await,
        Paging::Sequential { page_size } => collect_sequential(adapter, credential, page_size, ctx).await,
    }
}

/// Parallel strategy: learn the total, then fetch all pages with a bounded
/// worker pool and reassemble them by page index.
///
/// When `first` is given (page 0 already fetched at `page_size`), the probe
/// request and page 0 are skipped. Individual page failures are logged and
/// excluded; the walk fails only if every page failed.
pub async fn collect_parallel(
    adapter: &dyn ServiceAdapter,
    credential: &Credential,
    page_size: usize,
    first: Option<Page>,
    ctx: &FetchContext,
) -> MirrorResult<Collected> {
    let tag = adapter.tag();
    let page_size = page_size.max(1);

    let (total_count, mut pages) = match first {
        Some(page) => {
            let total = page.total_count.unwrap_or(page.raw_len());
            let mut pages = BTreeMap::new();
            ctx.batch(&page.items);
            pages.insert(0, page.items);
            (total, pages)
        }
        None => {
            // Size-1 probe: the cheapest way to learn the total.
            let probe = adapter.fetch_first_page(credential, 1, &ctx.cancel).await?;
            let total = probe.total_count.unwrap_or(probe.raw_len());
            (total, BTreeMap::new())
        }
    };

    let wanted = ctx.cap(total_count);
    let page_count = wanted.div_ceil(page_size);
    let pending: Vec<usize> = (0..page_count).filter(|i| !pages.contains_key(i)).collect();
    debug!("{tag}: {total_count} items over {page_count} pages, {} to fetch", pending.len());

    let mut done: usize = pages.values().map(Vec::len).sum();
    ctx.progress(done, wanted);

    let mut failures = 0;
    let mut last_error = None;
    let to_fetch = pending.len();

    let mut results = futures::stream::iter(pending)
        .map(|index| async move {
            if ctx.is_cancelled() {
                return (index, Err(SyncError::Cancelled));
            }
            let page = adapter.fetch_page(credential, index, page_size, &ctx.cancel).await;
            (index, page.map(|p| p.items))
        })
        .buffer_unordered(ctx.concurrency.max(1));

    while let Some((index, result)) = results.next().await {
        match result {
            Ok(items) => {
                done += items.len();
                ctx.batch(&items);
                ctx.progress(done.min(wanted), wanted);
                pages.insert(index, items);
            }
            Err(SyncError::Cancelled) => {}
            Err(e) => {
                warn!("{tag}: page {} failed, excluding it: {e}", index + 1);
                failures += 1;
                last_error = Some(e);
            }
        }
    }

    ctx.checkpoint()?;
    if to_fetch > 0 && failures == to_fetch && pages.is_empty() {
        if let Some(e) = last_error {
            return Err(e);
        }
    }

    let mut torrents: Vec<CanonicalTorrent> = pages.into_values().flatten().collect();
    torrents.truncate(wanted);
    Ok(Collected {
        torrents,
        total_count,
    })
}

/// Single-shot strategy: one request, then chunked callbacks.
pub async fn collect_single_shot(
    adapter: &dyn ServiceAdapter,
    credential: &Credential,
    chunk_size: usize,
    ctx: &FetchContext,
) -> MirrorResult<Collected> {
    let page = adapter.fetch_first_page(credential, 0, &ctx.cancel).await?;
    ctx.checkpoint()?;

    let mut torrents = page.items;
    let total_count = page.total_count.unwrap_or(torrents.len());
    torrents.truncate(ctx.cap(torrents.len()));

    let wanted = torrents.len();
    let mut done = 0;
    for chunk in torrents.chunks(chunk_size.max(1)) {
        done += chunk.len();
        ctx.batch(chunk);
        ctx.progress(done, wanted);
    }

    Ok(Collected {
        torrents,
        total_count,
    })
}

/// Sequential strategy: fixed-size pages in order until a short or empty
/// page. Never parallel, since offsets are not stable under concurrent reads.
pub async fn collect_sequential(
    adapter: &dyn ServiceAdapter,
    credential: &Credential,
    page_size: usize,
    ctx: &FetchContext,
) -> MirrorResult<Collected> {
    let tag = adapter.tag();
    let page_size = page_size.max(1);

    // End of list is judged on what the backend sent, so a record that
    // fails to convert cannot make a full page look short.
    let first = adapter.fetch_first_page(credential, page_size, &ctx.cancel).await?;
    let mut last_len = first.raw_len();
    let mut torrents = first.items;
    ctx.batch(&torrents);
    ctx.progress(torrents.len(), torrents.len());

    let mut index = 0;
    let mut consecutive_failures = 0;

    while last_len >= page_size && ctx.max_items.is_none_or(|max| torrents.len() < max) {
        index += 1;
        ctx.checkpoint()?;

        match adapter.fetch_page(credential, index, page_size, &ctx.cancel).await {
            Ok(page) => {
                consecutive_failures = 0;
                last_len = page.raw_len();
                ctx.batch(&page.items);
                torrents.extend(page.items);
                ctx.progress(torrents.len(), torrents.len());
            }
            Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
            Err(e) => {
                consecutive_failures += 1;
                warn!("{tag}: page {} failed, excluding it: {e}", index + 1);
                if consecutive_failures >= MAX_CONSECUTIVE_PAGE_FAILURES {
                    return Err(e);
                }
                // Keep walking; the end is signalled by a short page.
                last_len = page_size;
            }
        }
    }

    ctx.checkpoint()?;
    torrents.truncate(ctx.cap(torrents.len()));
    let total_count = torrents.len();
    Ok(Collected {
        torrents,
        total_count,
    })
}
