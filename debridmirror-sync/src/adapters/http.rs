//! Shared HTTP plumbing for the backend adapters.
//!
//! Bearer-authenticated GETs with a fixed timeout. Non-success statuses are
//! classified into transient or permanent [`SyncError`]s here so the rate
//! limiter can decide what to retry.

use crate::error::{MirrorResult, SyncError};
use crate::rate_limiter::Attempt;
use debridmirror_types::Credential;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Cache-busting query parameter attached to every attempt.
pub const CACHE_BUSTER_PARAM: &str = "_cb";

/// HTTP client bound to one backend's base URL.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> MirrorResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authenticated GET. Returns the response only for 2xx statuses.
    pub async fn get(
        &self,
        credential: &Credential,
        path: &str,
        query: &[(&str, String)],
        attempt: &Attempt,
    ) -> MirrorResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(credential.token())
            .query(query)
            .query(&[(CACHE_BUSTER_PARAM, attempt.cache_buster.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        debug!("GET {path} -> {status} (attempt {})", attempt.number);
        Err(SyncError::from_status(status.as_u16(), error_message(status, &body)))
    }
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status.to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}
