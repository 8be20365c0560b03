//! Backend adapters.
//!
//! Each adapter hides one backend's paging, auth and payload quirks behind
//! [`ServiceAdapter`] and converts raw records into [`CanonicalTorrent`]s.
//! How pages are walked (parallel pool, single shot, sequential) is declared
//! by [`Paging`] and driven by [`crate::collect`].

mod convert;
mod http;
mod paged;
mod raw;
mod sequential;
mod single_shot;

pub use convert::{infer_media_type, normalize_hash, normalize_link};
pub use http::ApiClient;
pub use paged::PagedAdapter;
pub use raw::{RawA, RawAFile, RawB, RawBLink, RawC, RawCFile, RawTorrent, convert_page};
pub use sequential::SequentialAdapter;
pub use single_shot::SingleShotAdapter;

use crate::error::MirrorResult;
use async_trait::async_trait;
use debridmirror_types::{CanonicalTorrent, Credential, ServiceTag};
use tokio_util::sync::CancellationToken;

/// How a backend's collection has to be walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    /// Total count is known up front; pages can be fetched concurrently.
    Parallel { page_size: usize },
    /// One call returns everything; `chunk_size` only paces callbacks.
    SingleShot { chunk_size: usize },
    /// No total count; walk pages in order until a short or empty page.
    Sequential { page_size: usize },
}

/// One response's worth of converted records.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<CanonicalTorrent>,
    /// Present only for backends that report a total.
    pub total_count: Option<usize>,
    /// Records the backend returned that failed to convert.
    pub skipped: usize,
}

impl Page {
    pub fn new(items: Vec<CanonicalTorrent>, total_count: Option<usize>) -> Self {
        Self {
            items,
            total_count,
            skipped: 0,
        }
    }

    /// Number of records the backend actually sent, converted or not.
    pub fn raw_len(&self) -> usize {
        self.items.len() + self.skipped
    }
}

/// One remote backend.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    fn tag(&self) -> ServiceTag;

    fn paging(&self) -> Paging;

    /// True when the backend lists newest-first in a stable order, which makes
    /// the overlap reuse of a previous full list valid.
    fn stable_newest_first(&self) -> bool {
        false
    }

    fn supports_pagination(&self) -> bool {
        !matches!(self.paging(), Paging::SingleShot { .. })
    }

    fn supports_total_count(&self) -> bool {
        matches!(self.paging(), Paging::Parallel { .. })
    }

    /// Fetches page 0 with the given size, plus the total when available.
    ///
    /// Once `cancel` fires no further attempt is sent.
    async fn fetch_first_page(
        &self,
        credential: &Credential,
        page_size: usize,
        cancel: &CancellationToken,
    ) -> MirrorResult<Page>;

    /// Fetches the page at 0-based `page_index`.
    async fn fetch_page(
        &self,
        credential: &Credential,
        page_index: usize,
        page_size: usize,
        cancel: &CancellationToken,
    ) -> MirrorResult<Page>;
}
