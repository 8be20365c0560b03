//! Per-service request gate with retry and backoff.
//!
//! Every request for a service tag passes through that tag's lane. A lane
//! hands out start slots one at a time, spaced by the service's minimum
//! interval, so request *starts* are serialized while completions overlap
//! freely. Transient failures are retried per the [`RetryPolicy`]; every
//! attempt, retries included, takes a fresh slot and a fresh cache-busting
//! token. Once the caller's cancellation token fires no further attempt is
//! started; an attempt already sent is allowed to finish.

use crate::config::SyncConfig;
use crate::error::{MirrorResult, SyncError};
use crate::retry::RetryPolicy;
use debridmirror_types::ServiceTag;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Context for one attempt of a request.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 1-based.
    pub number: u32,
    /// Unique per attempt; send it as a throwaway query parameter so
    /// intermediate caches cannot replay a stale error.
    pub cache_buster: String,
}

impl Attempt {
    fn new(number: u32) -> Self {
        Self {
            number,
            cache_buster: Uuid::new_v4().simple().to_string(),
        }
    }
}

/// Request pacing state for one service.
struct Lane {
    min_interval: Duration,
    last_request_at: Mutex<Option<Instant>>,
    retry_counts: Mutex<HashMap<String, u32>>,
}

impl Lane {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request_at: Mutex::new(None),
            retry_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Waits for this lane's next start slot and claims it.
    ///
    /// The lock is held across the sleep, so waiters queue in FIFO order.
    async fn wait_turn(&self) {
        let mut last = self.last_request_at.lock().await;
        if let Some(prev) = *last {
            tokio::time::sleep_until(prev + self.min_interval).await;
        }
        *last = Some(Instant::now());
    }
}

/// Serializes request starts per service and retries transient failures.
pub struct RateLimiter {
    policy: RetryPolicy,
    default_interval: Duration,
    lanes: Mutex<HashMap<ServiceTag, Arc<Lane>>>,
}

impl RateLimiter {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            default_interval: Duration::ZERO,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a limiter with each service's configured minimum interval.
    pub fn from_config(config: &SyncConfig) -> Self {
        let lanes = ServiceTag::ALL
            .into_iter()
            .map(|tag| {
                let interval = Duration::from_millis(config.endpoint(tag).min_interval_ms);
                (tag, Arc::new(Lane::new(interval)))
            })
            .collect();
        Self {
            policy: config.retry,
            default_interval: Duration::ZERO,
            lanes: Mutex::new(lanes),
        }
    }

    /// Sets the minimum interval for one service.
    pub fn with_min_interval(self, tag: ServiceTag, interval: Duration) -> Self {
        let mut lanes = self.lanes.into_inner();
        lanes.insert(tag, Arc::new(Lane::new(interval)));
        Self {
            lanes: Mutex::new(lanes),
            ..self
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn lane(&self, tag: ServiceTag) -> Arc<Lane> {
        let mut lanes = self.lanes.lock().await;
        lanes
            .entry(tag)
            .or_insert_with(|| Arc::new(Lane::new(self.default_interval)))
            .clone()
    }

    /// Runs `call` through the service's lane, retrying transient failures.
    ///
    /// `request_key` identifies the logical request for retry bookkeeping.
    /// The last error is returned once the policy's attempts are exhausted;
    /// non-retryable errors return immediately. Waiting for a slot or a
    /// backoff ends early with `SyncError::Cancelled` when `cancel` fires.
    pub async fn execute<T, F, Fut>(
        &self,
        tag: ServiceTag,
        request_key: &str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> MirrorResult<T>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = MirrorResult<T>>,
    {
        let lane = self.lane(tag).await;
        let mut number = 1;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    lane.retry_counts.lock().await.remove(request_key);
                    debug!("{tag} {request_key} cancelled before attempt {number}");
                    return Err(SyncError::Cancelled);
                }
                _ = lane.wait_turn() => {}
            }

            match call(Attempt::new(number)).await {
                Ok(value) => {
                    if number > 1 {
                        debug!("{tag} {request_key} succeeded after {} retries", number - 1);
                    }
                    lane.retry_counts.lock().await.remove(request_key);
                    return Ok(value);
                }
                Err(e) if self.policy.should_retry(number, &e) => {
                    let delay = self.policy.jittered_delay(number);
                    lane.retry_counts
                        .lock()
                        .await
                        .insert(request_key.to_string(), number);
                    warn!(
                        "{tag} {request_key} failed (attempt {number}/{}): {e}, retrying in {delay:?}",
                        self.policy.max_attempts
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            lane.retry_counts.lock().await.remove(request_key);
                            debug!("{tag} {request_key} cancelled during backoff");
                            return Err(SyncError::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    number += 1;
                }
                Err(e) => {
                    lane.retry_counts.lock().await.remove(request_key);
                    return Err(e);
                }
            }
        }
    }

    /// Retries spent so far by a request that is still in progress.
    pub async fn retry_count(&self, tag: ServiceTag, request_key: &str) -> u32 {
        let lane = self.lane(tag).await;
        let counts = lane.retry_counts.lock().await;
        counts.get(request_key).copied().unwrap_or(0)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
