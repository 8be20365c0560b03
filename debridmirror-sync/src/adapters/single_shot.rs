//! Service B: the whole collection in one response.

use super::http::ApiClient;
use super::raw::{RawB, RawTorrent, convert_page};
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
    status: String,
    #[serde(default)]
    data: Option<EnvelopeData>,
    #[serde(default)]
    error: Option<EnvelopeError>,
}

#[derive(Deserialize)]
struct EnvelopeData {
    #[serde(default)]
    magnets: Vec<RawB>,
}

#[derive(Deserialize)]
struct EnvelopeError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Adapter for the backend without pagination.
pub struct SingleShotAdapter {
    api: ApiClient,
    limiter: Arc<RateLimiter>,
    chunk_size: usize,
}

impl SingleShotAdapter {
    pub fn new(api: ApiClient, limiter: Arc<RateLimiter>, chunk_size: usize) -> Self {
        Self {
            api,
            limiter,
            chunk_size,
        }
    }

    pub fn from_config(config: &SyncConfig, limiter: Arc<RateLimiter>) -> MirrorResult<Self> {
        let api = ApiClient::new(&config.service_b.base_url, config.request_timeout())?;
        Ok(Self::new(api, limiter, config.single_shot_chunk_size))
    }

    async fn request(&self, credential: &Credential, attempt: Attempt) -> MirrorResult<Vec<RawB>> {
        let resp = self
            .api
            .get(credential, "/magnet/status", &[], &attempt)
            .await?;
        let envelope: Envelope = resp.json().await?;

        if envelope.status != "success" {
            let (code, message) = envelope
                .error
                .map(|e| (e.code, e.message))
                .unwrap_or_default();
            // The backend answers 200 with an error body; treat it like a 4xx.
            return Err(SyncError::Permanent {
                status: 200,
                message: format!("{code}: {message}"),
            });
        }

        Ok(envelope.data.map(|d| d.magnets).unwrap_or_default())
    }
}

#[async_trait]
impl ServiceAdapter for SingleShotAdapter {
    fn tag(&self) -> ServiceTag {
        ServiceTag::B
    }

    fn paging(&self) -> Paging {
        Paging::SingleShot {
            chunk_size: self.chunk_size,
        }
    }

    /// Fetches everything; `page_size` is ignored.
    async fn fetch_first_page(
        &self,
        credential: &Credential,
        _page_size: usize,
        cancel: &CancellationToken,
    ) -> MirrorResult<Page> {
        let raws = self
            .limiter
            .execute(ServiceTag::B, "magnet/status", cancel, |attempt| {
                self.request(credential, attempt)
            })
            .await?;

        let mut page = convert_page(raws.into_iter().map(RawTorrent::B), None);
        page.total_count = Some(page.items.len());
        Ok(page)
    }

    async fn fetch_page(
        &self,
        _credential: &Credential,
        _page_index: usize,
        _page_size: usize,
        _cancel: &CancellationToken,
    ) -> MirrorResult<Page> {
        Err(SyncError::Unsupported("svc-b has no pagination".into()))
    }
}
