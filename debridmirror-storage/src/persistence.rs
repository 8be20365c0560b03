//! The persistence seam behind [`crate::LocalStore`].

use crate::error::{StoreError, StoreResult};
use debridmirror_types::CanonicalTorrent;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Durable storage for mirrored torrents.
///
/// Calls are blocking; the local store runs them on the blocking pool.
pub trait TorrentPersistence: Send + Sync {
    /// Every persisted torrent.
    fn load_all(&self) -> StoreResult<Vec<CanonicalTorrent>>;

    /// Upserts and deletes individual rows in one transaction.
    fn apply_changes(&self, upserted: &[CanonicalTorrent], removed: &[String]) -> StoreResult<()>;

    /// Replaces the whole table with `torrents` in one transaction.
    fn replace_all(&self, torrents: &[CanonicalTorrent]) -> StoreResult<()>;
}

/// Keeps rows in memory. Counts calls and can be told to fail, which makes it
/// the persistence of choice for exercising the store's write path.
#[derive(Default)]
pub struct MemoryPersistence {
    rows: Mutex<BTreeMap<String, CanonicalTorrent>>,
    apply_calls: AtomicUsize,
    replace_calls: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `torrents` already persisted.
    pub fn with_rows(torrents: Vec<CanonicalTorrent>) -> Self {
        let rows = torrents.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    /// While set, every write fails and leaves the rows untouched.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn replace_calls(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rows(&self) -> StoreResult<std::sync::MutexGuard<'_, BTreeMap<String, CanonicalTorrent>>> {
        self.rows
            .lock()
            .map_err(|_| StoreError::Persistence("row lock poisoned".into()))
    }

    fn check_failing(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Persistence("simulated write failure".into()));
        }
        Ok(())
    }
}

impl TorrentPersistence for MemoryPersistence {
    fn load_all(&self) -> StoreResult<Vec<CanonicalTorrent>> {
        Ok(self.rows()?.values().cloned().collect())
    }

    fn apply_changes(&self, upserted: &[CanonicalTorrent], removed: &[String]) -> StoreResult<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        let mut rows = self.rows()?;
        for id in removed {
            rows.remove(id);
        }
        for torrent in upserted {
            rows.insert(torrent.id.clone(), torrent.clone());
        }
        Ok(())
    }

    fn replace_all(&self, torrents: &[CanonicalTorrent]) -> StoreResult<()> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        let mut rows = self.rows()?;
        *rows = torrents.iter().map(|t| (t.id.clone(), t.clone())).collect();
        Ok(())
    }
}
