//! Service C: offset paging with no total count.

use super::http::ApiClient;
use super::raw::{RawC, RawTorrent, convert_page};
use super::{Page, Paging, ServiceAdapter};
use crate::config::SyncConfig;
use crate::error::{MirrorResult, SyncError};
use crate::rate_limiter::{Attempt, RateLimiter};
use async_trait::async_trait;
use debridmirror_types::{Credential, ServiceTag};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<Vec<RawC>>,
    #[serde(default)]
    detail: Option<String>,
}

/// Adapter for the backend whose total is unknown until the last page.
pub struct SequentialAdapter {
    api: ApiClient,
    limiter: Arc<RateLimiter>,
    page_size: usize,
}

impl SequentialAdapter {
    pub fn new(api: ApiClient, limiter: Arc<RateLimiter>, page_size: usize) -> Self {
        Self {
            api,
            limiter,
            page_size,
        }
    }

    pub fn from_config(config: &SyncConfig, limiter: Arc<RateLimiter>) -> MirrorResult<Self> {
        let api = ApiClient::new(&config.service_c.base_url, config.request_timeout())?;
        Ok(Self::new(api, limiter, config.sequential_page_size))
    }

    async fn request(
        &self,
        credential: &Credential,
        offset: usize,
        limit: usize,
        attempt: Attempt,
    ) -> MirrorResult<Vec<RawC>> {
        let resp = self
            .api
            .get(
                credential,
                "/torrents/mylist",
                &[("offset", offset.to_string()), ("limit", limit.to_string())],
                &attempt,
            )
            .await?;
        let envelope: Envelope = resp.json().await?;

        if !envelope.success {
            return Err(SyncError::Permanent {
                status: 200,
                message: envelope.detail.unwrap_or_else(|| "request unsuccessful".into()),
            });
        }
        Ok(envelope.data.unwrap_or_default())
    }

    async fn fetch(
        &self,
        credential: &Credential,
        offset: usize,
        limit: usize,
        cancel: &CancellationToken,
    ) -> MirrorResult<Page> {
        let key = format!("mylist?offset={offset}&limit={limit}");
        let raws = self
            .limiter
            .execute(ServiceTag::C, &key, cancel, |attempt| {
                self.request(credential, offset, limit, attempt)
            })
            .await?;
        Ok(convert_page(raws.into_iter().map(RawTorrent::C), None))
    }
}

#[async_trait]
impl ServiceAdapter for SequentialAdapter {
    fn tag(&self) -> ServiceTag {
        ServiceTag::C
    }

    fn paging(&self) -> Paging {
        Paging::Sequential {
            page_size: self.page_size,
        }
    }

    async fn fetch_first_page(
        &self,
        credential: &Credential,
        page_size: usize,
        cancel: &CancellationToken,
    ) -> MirrorResult<Page> {
        self.fetch(credential, 0, page_size, cancel).await
    }

    async fn fetch_page(
        &self,
        credential: &Credential,
        page_index: usize,
        page_size: usize,
        cancel: &CancellationToken,
    ) -> MirrorResult<Page> {
        self.fetch(credential, page_index * page_size, page_size, cancel)
            .await
    }
}
