//! Local mirror store for debridmirror.
//!
//! Persists the unioned torrent libraries and reports exactly which rows
//! changed on each reconcile.
//!
//! # Architecture
//!
//! - [`LocalStore`] diffs each full torrent set against a signature snapshot
//!   and debounces the resulting writes
//! - [`TorrentPersistence`] is the storage seam; [`DuckDbPersistence`] keeps
//!   rows in a DuckDB file, [`MemoryPersistence`] keeps them in memory
//! - Large diffs replace the whole table in one pass

mod config;
mod duckdb_store;
mod error;
mod local_store;
mod persistence;

pub use config::StoreConfig;
pub use duckdb_store::DuckDbPersistence;
pub use error::{StoreError, StoreResult};
pub use local_store::{ChangeSet, LocalStore};
pub use persistence::{MemoryPersistence, TorrentPersistence};
