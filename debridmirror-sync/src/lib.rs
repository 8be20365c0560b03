//! Library sync engine for debridmirror.
//!
//! Mirrors the torrent libraries of several remote debrid backends:
//! - Per-service request pacing with retry and backoff
//! - Paging adapters for parallel, single-shot and sequential backends
//! - TTL snapshot cache and in-flight de-duplication
//! - Overlap reuse of a previous full list for stable newest-first backends

pub mod adapters;
pub mod cache_store;
pub mod collect;
pub mod config;
pub mod engine;
pub mod error;
pub mod overlap;
pub mod rate_limiter;
pub mod retry;

pub use adapters::{Page, Paging, ServiceAdapter};
pub use cache_store::CacheStore;
pub use collect::{BatchCallback, FetchContext, ProgressCallback};
pub use config::{ServiceEndpoint, SyncConfig};
pub use engine::{LibrarySyncEngine, LibrarySyncReport, ServiceOutcome, SyncOptions};
pub use error::{MirrorResult, SyncError};
pub use overlap::{OverlapBoundary, OverlapCacheStrategy, find_overlap, splice};
pub use rate_limiter::{Attempt, RateLimiter};
pub use retry::RetryPolicy;
