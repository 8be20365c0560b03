//! Library sync configuration.

use crate::error::{MirrorResult, SyncError};
use crate::retry::RetryPolicy;
use debridmirror_types::ServiceTag;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where one backend lives and how fast we may call it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// API root, without a trailing slash (e.g. "https://api.svc-a.example/rest/1.0").
    pub base_url: String,

    /// Minimum spacing between request starts for this service.
    pub min_interval_ms: u64,
}

/// Configuration for the library sync engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub service_a: ServiceEndpoint,
    pub service_b: ServiceEndpoint,
    pub service_c: ServiceEndpoint,

    /// Per-request timeout. A timeout counts as a transient failure.
    pub request_timeout_secs: u64,

    /// Lifetime of a cached library snapshot.
    pub cache_ttl_secs: u64,

    /// How long a previous full list stays eligible for overlap reuse.
    pub overlap_max_age_secs: u64,

    /// Worker count for parallel page fetches.
    pub page_concurrency: usize,

    pub paged_page_size: usize,
    pub single_shot_chunk_size: usize,
    pub sequential_page_size: usize,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            service_a: ServiceEndpoint {
                base_url: "https://api.svc-a.example/rest/1.0".to_string(),
                min_interval_ms: 240,
            },
            service_b: ServiceEndpoint {
                base_url: "https://api.svc-b.example/v4".to_string(),
                min_interval_ms: 500,
            },
            service_c: ServiceEndpoint {
                base_url: "https://api.svc-c.example/v1/api".to_string(),
                min_interval_ms: 250,
            },
            request_timeout_secs: 30,
            cache_ttl_secs: 300,         // 5 minutes
            overlap_max_age_secs: 1_800, // 30 minutes
            page_concurrency: 4,
            paged_page_size: 1_500,
            single_shot_chunk_size: 50,
            sequential_page_size: 100,
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Parses a JSON config file body and validates it.
    pub fn from_json(json: &str) -> MirrorResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MirrorResult<()> {
        for tag in ServiceTag::ALL {
            if self.endpoint(tag).base_url.trim().is_empty() {
                return Err(SyncError::Config(format!("{tag}: base_url is empty")));
            }
        }
        if self.page_concurrency == 0 {
            return Err(SyncError::Config("page_concurrency must be at least 1".into()));
        }
        if self.paged_page_size == 0 || self.single_shot_chunk_size == 0 || self.sequential_page_size == 0 {
            return Err(SyncError::Config("page sizes must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn endpoint(&self, tag: ServiceTag) -> &ServiceEndpoint {
        match tag {
            ServiceTag::A => &self.service_a,
            ServiceTag::B => &self.service_b,
            ServiceTag::C => &self.service_c,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn overlap_max_age(&self) -> Duration {
        Duration::from_secs(self.overlap_max_age_secs)
    }

    /// Creates a config pointing every service at one local mock server.
    pub fn for_base_url(base_url: &str) -> Self {
        let endpoint = |min_interval_ms| ServiceEndpoint {
            base_url: base_url.trim_end_matches('/').to_string(),
            min_interval_ms,
        };
        Self {
            service_a: endpoint(0),
            service_b: endpoint(0),
            service_c: endpoint(0),
            request_timeout_secs: 5,
            ..Self::default()
        }
    }
}
