//! Library sync orchestrator.
//!
//! Ties together the adapters, the snapshot cache, and the overlap strategy:
//! - Cache lookups keyed by service and credential fingerprint
//! - At most one in-flight sync per service and credential; concurrent
//!   callers share its outcome
//! - Cancellation between page fetches, with no cache write on cancel
//!
//! The engine holds no global state. Build one per process (or per test) and
//! clone the handle wherever it is needed.

use crate::adapters::{
    PagedAdapter, Paging, SequentialAdapter, ServiceAdapter, SingleShotAdapter,
};
use crate::cache_store::CacheStore;
use crate::collect::{BatchCallback, FetchContext, ProgressCallback, collect};
use crate::config::SyncConfig;
use crate::error::{MirrorResult, SyncError};
use crate::overlap::OverlapCacheStrategy;
use crate::rate_limiter::RateLimiter;
use debridmirror_types::{CanonicalTorrent, Credential, ServiceTag, SyncResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-call sync options.
#[derive(Clone, Default)]
pub struct SyncOptions {
    /// Skip the snapshot cache, the overlap reuse, and any in-flight sync.
    pub force_refresh: bool,
    pub on_progress: Option<ProgressCallback>,
    pub on_batch: Option<BatchCallback>,
    pub signal: Option<CancellationToken>,
    pub max_items: Option<usize>,
    /// Overrides the configured page concurrency.
    pub concurrency: Option<usize>,
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    pub fn on_progress(mut self, f: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn on_batch(mut self, f: impl Fn(&[CanonicalTorrent]) + Send + Sync + 'static) -> Self {
        self.on_batch = Some(Arc::new(f));
        self
    }

    pub fn signal(mut self, token: CancellationToken) -> Self {
        self.signal = Some(token);
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = Some(workers);
        self
    }
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions")
            .field("force_refresh", &self.force_refresh)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_batch", &self.on_batch.is_some())
            .field("signal", &self.signal.is_some())
            .field("max_items", &self.max_items)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

/// Outcome of one service within [`LibrarySyncEngine::sync_all`].
#[derive(Debug, Clone)]
pub struct ServiceOutcome {
    pub tag: ServiceTag,
    pub result: MirrorResult<SyncResult>,
}

/// Outcome of syncing several services together.
#[derive(Debug, Clone, Default)]
pub struct LibrarySyncReport {
    pub outcomes: Vec<ServiceOutcome>,
}

impl LibrarySyncReport {
    /// Union of every successful service's torrents, first record per id.
    pub fn torrents(&self) -> Vec<CanonicalTorrent> {
        SyncResult::union(self.outcomes.iter().filter_map(|o| o.result.as_ref().ok()))
    }

    pub fn failures(&self) -> impl Iterator<Item = (ServiceTag, &SyncError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.tag, e)))
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

type SharedSync = Shared<BoxFuture<'static, MirrorResult<SyncResult>>>;

struct InFlight {
    generation: u64,
    task: SharedSync,
}

struct EngineInner {
    adapters: HashMap<ServiceTag, Arc<dyn ServiceAdapter>>,
    cache: CacheStore,
    overlap: OverlapCacheStrategy,
    in_flight: Mutex<HashMap<String, InFlight>>,
    next_generation: AtomicU64,
    page_concurrency: usize,
}

/// Mirrors remote libraries into canonical, cached [`SyncResult`]s.
#[derive(Clone)]
pub struct LibrarySyncEngine {
    inner: Arc<EngineInner>,
}

impl LibrarySyncEngine {
    /// Creates an engine over explicit adapters, one per service tag.
    pub fn new(config: &SyncConfig, adapters: Vec<Arc<dyn ServiceAdapter>>) -> Self {
        Self::with_timings(config.cache_ttl(), config.overlap_max_age(), config.page_concurrency, adapters)
    }

    /// Creates an engine with the three HTTP adapters sharing one rate limiter.
    pub fn from_config(config: &SyncConfig) -> MirrorResult<Self> {
        config.validate()?;
        let limiter = Arc::new(RateLimiter::from_config(config));
        let adapters: Vec<Arc<dyn ServiceAdapter>> = vec![
            Arc::new(PagedAdapter::from_config(config, limiter.clone())?),
            Arc::new(SingleShotAdapter::from_config(config, limiter.clone())?),
            Arc::new(SequentialAdapter::from_config(config, limiter)?),
        ];
        Ok(Self::new(config, adapters))
    }

    pub fn with_timings(
        cache_ttl: Duration,
        overlap_max_age: Duration,
        page_concurrency: usize,
        adapters: Vec<Arc<dyn ServiceAdapter>>,
    ) -> Self {
        let adapters = adapters.into_iter().map(|a| (a.tag(), a)).collect();
        Self {
            inner: Arc::new(EngineInner {
                adapters,
                cache: CacheStore::new(cache_ttl),
                overlap: OverlapCacheStrategy::new(overlap_max_age),
                in_flight: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                page_concurrency: page_concurrency.max(1),
            }),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    /// Returns an up-to-date mirror of one service account's library.
    ///
    /// A concurrent call for the same service and credential joins the sync
    /// already running (unless `force_refresh` is set) and receives the same
    /// outcome; its own callbacks and signal are not attached to that sync.
    pub async fn sync(
        &self,
        tag: ServiceTag,
        credential: &Credential,
        options: SyncOptions,
    ) -> MirrorResult<SyncResult> {
        let adapter = self
            .inner
            .adapters
            .get(&tag)
            .cloned()
            .ok_or(SyncError::UnknownService(tag))?;
        let key = CacheStore::library_key(tag, credential);

        let task = {
            let mut in_flight = self.inner.in_flight.lock().await;

            if !options.force_refresh {
                if let Some(cached) = self.inner.cache.get::<SyncResult>(&key).await {
                    debug!("{tag}: cache hit ({} items)", cached.torrents.len());
                    return Ok(SyncResult {
                        cache_hit: true,
                        ..cached
                    });
                }
                if let Some(existing) = in_flight.get(&key) {
                    debug!("{tag}: joining in-flight sync");
                    existing.task.clone()
                } else {
                    self.start(&mut in_flight, key, adapter, credential.clone(), options)
                }
            } else {
                self.start(&mut in_flight, key, adapter, credential.clone(), options)
            }
        };

        task.await
    }

    /// Registers a new in-flight sync and returns its shared handle.
    fn start(
        &self,
        in_flight: &mut HashMap<String, InFlight>,
        key: String,
        adapter: Arc<dyn ServiceAdapter>,
        credential: Credential,
        options: SyncOptions,
    ) -> SharedSync {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.clone();
        let task_key = key.clone();

        let task = async move {
            let outcome = inner.run(adapter.as_ref(), &credential, &task_key, &options).await;
            let outcome = match outcome {
                Ok(result) => match inner.cache.set_default(&task_key, &result).await {
                    Ok(()) => Ok(result),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };

            let mut in_flight = inner.in_flight.lock().await;
            if in_flight.get(&task_key).is_some_and(|f| f.generation == generation) {
                in_flight.remove(&task_key);
            }
            outcome
        }
        .boxed()
        .shared();

        in_flight.insert(
            key,
            InFlight {
                generation,
                task: task.clone(),
            },
        );
        task
    }

    /// Syncs several service accounts concurrently.
    pub async fn sync_all(
        &self,
        requests: &[(ServiceTag, Credential)],
        options: SyncOptions,
    ) -> LibrarySyncReport {
        let syncs = requests.iter().map(|(tag, credential)| {
            let options = options.clone();
            async move {
                let result = self.sync(*tag, credential, options).await;
                if let Err(e) = &result {
                    warn!("{tag}: sync failed: {e}");
                }
                ServiceOutcome { tag: *tag, result }
            }
        });
        LibrarySyncReport {
            outcomes: futures::future::join_all(syncs).await,
        }
    }

    /// Clears one account's cached library, or the whole cache for `None`.
    pub async fn clear_cache(&self, target: Option<(ServiceTag, &Credential)>) {
        match target {
            Some((tag, credential)) => {
                let key = CacheStore::library_key(tag, credential);
                debug!("{tag}: clearing cached library");
                self.inner.cache.clear(Some(&[key])).await;
            }
            None => {
                info!("clearing all cached libraries");
                self.inner.cache.clear(None).await;
            }
        }
    }

    /// Clears every cached library of one service.
    pub async fn clear_service_cache(&self, tag: ServiceTag) {
        self.inner.cache.clear_prefix(&format!("{tag}:library:")).await;
    }

    /// Drops the previous full list kept for overlap reuse.
    pub async fn forget_overlap(&self, tag: ServiceTag, credential: &Credential) {
        let key = CacheStore::library_key(tag, credential);
        self.inner.overlap.forget(&key).await;
    }

    /// Number of syncs currently running.
    pub async fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().await.len()
    }
}

impl EngineInner {
    async fn run(
        &self,
        adapter: &dyn ServiceAdapter,
        credential: &Credential,
        key: &str,
        options: &SyncOptions,
    ) -> MirrorResult<SyncResult> {
        let tag = adapter.tag();
        let ctx = FetchContext {
            concurrency: options.concurrency.unwrap_or(self.page_concurrency).max(1),
            max_items: options.max_items,
            on_progress: options.on_progress.clone(),
            on_batch: options.on_batch.clone(),
            cancel: options.signal.clone().unwrap_or_default(),
        };
        ctx.checkpoint()?;

        match adapter.paging() {
            Paging::Parallel { page_size } if adapter.stable_newest_first() => {
                if options.force_refresh {
                    let collected = collect(adapter, credential, &ctx).await?;
                    if ctx.max_items.is_none() {
                        self.overlap.remember(key, collected.torrents.clone()).await;
                    }
                    Ok(SyncResult::new(collected.torrents, collected.total_count, false))
                } else {
                    self.overlap.sync(key, adapter, credential, page_size, &ctx).await
                }
            }
            _ => {
                let collected = collect(adapter, credential, &ctx).await?;
                debug!("{tag}: collected {} items", collected.torrents.len());
                Ok(SyncResult::new(collected.torrents, collected.total_count, false))
            }
        }
    }
}
