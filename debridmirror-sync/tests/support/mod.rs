//! Shared fixtures for the sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset};
use debridmirror_sync::{MirrorResult, Page, Paging, ServiceAdapter, SyncError};
use debridmirror_types::{
    CanonicalTorrent, Credential, MediaType, ServiceTag, TorrentStatus, compose_id,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A finished torrent with deterministic fields derived from `n`.
pub fn torrent(tag: ServiceTag, n: u64) -> CanonicalTorrent {
    let base = DateTime::<FixedOffset>::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
    CanonicalTorrent {
        id: compose_id(tag, n),
        hash: format!("{n:040x}"),
        filename: format!("file-{n}.bin"),
        bytes: 1_000 + n,
        media_type: MediaType::Other,
        status: TorrentStatus::Finished,
        service_status: "downloaded".into(),
        progress: 100.0,
        added_at: base + ChronoDuration::minutes(n as i64),
        seeders: 0,
        speed: 0,
        links: vec![format!("https://dl.example/{n}")],
        selected_files: vec![],
    }
}

/// `count` torrents, newest (highest number) first.
pub fn library(tag: ServiceTag, count: u64) -> Vec<CanonicalTorrent> {
    (1..=count).rev().map(|n| torrent(tag, n)).collect()
}

/// Same record, still downloading.
pub fn in_progress(mut t: CanonicalTorrent, progress: f64) -> CanonicalTorrent {
    t.status = TorrentStatus::Downloading;
    t.service_status = "downloading".into();
    t.progress = progress;
    t
}

pub fn ids(torrents: &[CanonicalTorrent]) -> Vec<String> {
    torrents.iter().map(|t| t.id.clone()).collect()
}

pub fn credential() -> Credential {
    Credential::new("test-token")
}

/// In-memory backend with call counters and injectable failures.
pub struct FakeAdapter {
    tag: ServiceTag,
    paging: Paging,
    stable: bool,
    latency: Duration,
    library: Mutex<Vec<CanonicalTorrent>>,
    failing_pages: Mutex<HashSet<usize>>,
    skipped_records: Mutex<HashMap<usize, usize>>,
    fail_everything: Mutex<Option<SyncError>>,
    first_page_calls: AtomicUsize,
    page_calls: Mutex<Vec<usize>>,
}

impl FakeAdapter {
    pub fn new(tag: ServiceTag, paging: Paging, library: Vec<CanonicalTorrent>) -> Self {
        Self {
            tag,
            paging,
            stable: false,
            latency: Duration::ZERO,
            library: Mutex::new(library),
            failing_pages: Mutex::new(HashSet::new()),
            skipped_records: Mutex::new(HashMap::new()),
            fail_everything: Mutex::new(None),
            first_page_calls: AtomicUsize::new(0),
            page_calls: Mutex::new(Vec::new()),
        }
    }

    /// Parallel, total-reporting and stable newest-first, like service A.
    pub fn paged(library: Vec<CanonicalTorrent>, page_size: usize) -> Self {
        Self {
            stable: true,
            ..Self::new(ServiceTag::A, Paging::Parallel { page_size }, library)
        }
    }

    pub fn single_shot(library: Vec<CanonicalTorrent>, chunk_size: usize) -> Self {
        Self::new(ServiceTag::B, Paging::SingleShot { chunk_size }, library)
    }

    pub fn sequential(library: Vec<CanonicalTorrent>, page_size: usize) -> Self {
        Self::new(ServiceTag::C, Paging::Sequential { page_size }, library)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn unstable(mut self) -> Self {
        self.stable = false;
        self
    }

    pub fn set_library(&self, library: Vec<CanonicalTorrent>) {
        *self.library.lock().unwrap() = library;
    }

    /// Makes `fetch_page(index, ..)` fail with a server error.
    pub fn fail_page(&self, index: usize) {
        self.failing_pages.lock().unwrap().insert(index);
    }

    /// Reports the first `count` records of page `index` as unconvertible,
    /// the way a real adapter drops a record with a bad hash.
    pub fn skip_records(&self, index: usize, count: usize) {
        self.skipped_records.lock().unwrap().insert(index, count);
    }

    /// Makes every request fail with `err`; `None` restores normal service.
    pub fn fail_all(&self, err: Option<SyncError>) {
        *self.fail_everything.lock().unwrap() = err;
    }

    pub fn first_page_calls(&self) -> usize {
        self.first_page_calls.load(Ordering::SeqCst)
    }

    /// Indexes requested through `fetch_page`, in call order.
    pub fn page_calls(&self) -> Vec<usize> {
        self.page_calls.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.first_page_calls() + self.page_calls().len()
    }

    fn slice(&self, start: usize, len: usize) -> Vec<CanonicalTorrent> {
        let library = self.library.lock().unwrap();
        let start = start.min(library.len());
        let end = start.saturating_add(len).min(library.len());
        library[start..end].to_vec()
    }

    fn page(&self, index: usize, page_size: usize, total_count: Option<usize>) -> Page {
        let mut items = self.slice(index * page_size, page_size);
        let skipped = self
            .skipped_records
            .lock()
            .unwrap()
            .get(&index)
            .copied()
            .unwrap_or(0)
            .min(items.len());
        items.drain(..skipped);
        Page {
            items,
            total_count,
            skipped,
        }
    }

    fn check_failure(&self) -> MirrorResult<()> {
        match self.fail_everything.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ServiceAdapter for FakeAdapter {
    fn tag(&self) -> ServiceTag {
        self.tag
    }

    fn paging(&self) -> Paging {
        self.paging
    }

    fn stable_newest_first(&self) -> bool {
        self.stable
    }

    async fn fetch_first_page(
        &self,
        _credential: &Credential,
        page_size: usize,
        _cancel: &CancellationToken,
    ) -> MirrorResult<Page> {
        self.first_page_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.check_failure()?;

        let total = self.library.lock().unwrap().len();
        match self.paging {
            Paging::Parallel { .. } => Ok(self.page(0, page_size, Some(total))),
            Paging::SingleShot { .. } => Ok(Page::new(self.slice(0, total), Some(total))),
            Paging::Sequential { .. } => Ok(self.page(0, page_size, None)),
        }
    }

    async fn fetch_page(
        &self,
        _credential: &Credential,
        page_index: usize,
        page_size: usize,
        _cancel: &CancellationToken,
    ) -> MirrorResult<Page> {
        self.page_calls.lock().unwrap().push(page_index);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.check_failure()?;

        if self.failing_pages.lock().unwrap().contains(&page_index) {
            return Err(SyncError::from_status(500, format!("page {page_index} exploded")));
        }
        Ok(self.page(page_index, page_size, None))
    }
}
