//! Service A: paged listing with a total count header.

use super::http::ApiClient;
use super::raw::{RawA, RawTorrent, convert_page};
use super::{Page, Paging, ServiceAdapter};
use crate::config::SyncConfig;
use crate::error::{MirrorResult, SyncError};
use crate::rate_limiter::{Attempt, RateLimiter};
use async_trait::async_trait;
use debridmirror_types::{Credential, ServiceTag};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Adapter for the backend that pages newest-first and reports its total.
pub struct PagedAdapter {
    api: ApiClient,
    limiter: Arc<RateLimiter>,
    page_size: usize,
}

impl PagedAdapter {
    pub fn new(api: ApiClient, limiter: Arc<RateLimiter>, page_size: usize) -> Self {
        Self {
            api,
            limiter,
            page_size,
        }
    }

    pub fn from_config(config: &SyncConfig, limiter: Arc<RateLimiter>) -> MirrorResult<Self> {
        let api = ApiClient::new(&config.service_a.base_url, config.request_timeout())?;
        Ok(Self::new(api, limiter, config.paged_page_size))
    }

    /// One request for a 1-based page number.
    async fn request(
        &self,
        credential: &Credential,
        page: usize,
        limit: usize,
        attempt: Attempt,
    ) -> MirrorResult<(Vec<RawA>, Option<usize>)> {
        let resp = self
            .api
            .get(
                credential,
                "/torrents",
                &[("page", page.to_string()), ("limit", limit.to_string())],
                &attempt,
            )
            .await?;

        let total = resp
            .headers()
            .get(TOTAL_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok());

        if resp.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok((Vec::new(), total.or(Some(0))));
        }

        let body = resp.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok((Vec::new(), total));
        }
        let raws: Vec<RawA> = serde_json::from_slice(&body)
            .map_err(|e| SyncError::Malformed(format!("torrent list page {page}: {e}")))?;
        Ok((raws, total))
    }

    async fn fetch(
        &self,
        credential: &Credential,
        page: usize,
        limit: usize,
        cancel: &CancellationToken,
    ) -> MirrorResult<Page> {
        let key = format!("torrents?page={page}&limit={limit}");
        let (raws, total) = self
            .limiter
            .execute(ServiceTag::A, &key, cancel, |attempt| {
                self.request(credential, page, limit, attempt)
            })
            .await?;
        Ok(convert_page(raws.into_iter().map(RawTorrent::A), total))
    }
}

#[async_trait]
impl ServiceAdapter for PagedAdapter {
    fn tag(&self) -> ServiceTag {
        ServiceTag::A
    }

    fn paging(&self) -> Paging {
        Paging::Parallel {
            page_size: self.page_size,
        }
    }

    fn stable_newest_first(&self) -> bool {
        true
    }

    async fn fetch_first_page(
        &self,
        credential: &Credential,
        page_size: usize,
        cancel: &CancellationToken,
    ) -> MirrorResult<Page> {
        let page = self.fetch(credential, 1, page_size, cancel).await?;
        if page.total_count.is_none() {
            return Err(SyncError::Malformed(
                "svc-a: response is missing the total count header".into(),
            ));
        }
        Ok(page)
    }

    async fn fetch_page(
        &self,
        credential: &Credential,
        page_index: usize,
        page_size: usize,
        cancel: &CancellationToken,
    ) -> MirrorResult<Page> {
        self.fetch(credential, page_index + 1, page_size, cancel).await
    }
}
