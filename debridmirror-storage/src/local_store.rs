//! Diffing, debounced local mirror of the remote libraries.
//!
//! The store keeps a snapshot of `id -> signature` for everything it has
//! persisted. Each reconcile diffs a full torrent set against that snapshot
//! and schedules the diff for writing once reconciles have been quiet for the
//! debounce window. The snapshot only moves forward after a write succeeds.

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::persistence::{MemoryPersistence, TorrentPersistence};
use debridmirror_types::{CanonicalTorrent, Signature, signature};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Rows that differ between the snapshot and a new torrent set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub upserted: Vec<CanonicalTorrent>,
    pub removed: Vec<String>,
}

impl ChangeSet {
    /// Combined upserts and removals.
    pub fn len(&self) -> usize {
        self.upserted.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upserted.is_empty() && self.removed.is_empty()
    }
}

type Snapshot = HashMap<String, Signature>;

/// The latest reconciled set, waiting to be written.
struct PendingWrite {
    torrents: Vec<CanonicalTorrent>,
    signatures: Snapshot,
    changes: ChangeSet,
}

impl PendingWrite {
    fn new(torrents: Vec<CanonicalTorrent>, snapshot: &Snapshot) -> Self {
        let mut seen = HashSet::new();
        let torrents: Vec<CanonicalTorrent> = torrents
            .into_iter()
            .filter(|t| seen.insert(t.id.clone()))
            .collect();
        let signatures: Snapshot = torrents.iter().map(|t| (t.id.clone(), signature(t))).collect();
        let mut pending = Self {
            torrents,
            signatures,
            changes: ChangeSet::default(),
        };
        pending.rediff(snapshot);
        pending
    }

    fn rediff(&mut self, snapshot: &Snapshot) {
        let upserted = self
            .torrents
            .iter()
            .filter(|t| snapshot.get(&t.id) != self.signatures.get(&t.id))
            .cloned()
            .collect();
        let mut removed: Vec<String> = snapshot
            .keys()
            .filter(|id| !self.signatures.contains_key(*id))
            .cloned()
            .collect();
        removed.sort();
        self.changes = ChangeSet { upserted, removed };
    }
}

struct StoreState {
    snapshot: Snapshot,
    pending: Option<PendingWrite>,
    timer: Option<JoinHandle<()>>,
    timer_generation: u64,
}

struct StoreInner {
    persistence: Arc<dyn TorrentPersistence>,
    config: StoreConfig,
    state: Mutex<StoreState>,
    // Serializes writes so snapshots advance in order.
    write_lock: Mutex<()>,
    changes: broadcast::Sender<ChangeSet>,
}

/// Local mirror of the unioned remote libraries.
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<StoreInner>,
}

impl LocalStore {
    /// Opens a store over `persistence`, rebuilding the snapshot from the
    /// rows already persisted.
    pub async fn open(persistence: Arc<dyn TorrentPersistence>, config: StoreConfig) -> StoreResult<Self> {
        let loader = persistence.clone();
        let existing = tokio::task::spawn_blocking(move || loader.load_all())
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;
        let snapshot: Snapshot = existing.iter().map(|t| (t.id.clone(), signature(t))).collect();
        info!("local store opened with {} rows", snapshot.len());

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            inner: Arc::new(StoreInner {
                persistence,
                config,
                state: Mutex::new(StoreState {
                    snapshot,
                    pending: None,
                    timer: None,
                    timer_generation: 0,
                }),
                write_lock: Mutex::new(()),
                changes,
            }),
        })
    }

    /// Opens an empty store backed by memory.
    pub async fn in_memory(config: StoreConfig) -> StoreResult<Self> {
        Self::open(Arc::new(MemoryPersistence::new()), config).await
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Diffs a full torrent set against the snapshot and schedules the
    /// write. Returns the rows that will change.
    ///
    /// Reconciles within the debounce window coalesce: only the latest set is
    /// written. Duplicate ids keep their first record.
    pub async fn reconcile(&self, torrents: Vec<CanonicalTorrent>) -> ChangeSet {
        let mut state = self.inner.state.lock().await;
        let pending = PendingWrite::new(torrents, &state.snapshot);
        let changes = pending.changes.clone();

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.timer_generation += 1;

        if changes.is_empty() {
            debug!("reconcile: no changes");
            state.pending = None;
            return changes;
        }

        debug!(
            "reconcile: {} upserts, {} removals pending",
            changes.upserted.len(),
            changes.removed.len()
        );
        state.pending = Some(pending);
        state.timer = Some(self.arm_timer(state.timer_generation));
        changes
    }

    fn arm_timer(&self, generation: u64) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let delay = inner.config.debounce();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = inner.state.lock().await;
                if state.timer_generation != generation {
                    return;
                }
                // From here on the write must not be aborted.
                state.timer = None;
            }
            if let Err(e) = inner.write_pending().await {
                error!("debounced write failed: {e}");
            }
        })
    }

    /// Writes any pending diff now instead of waiting for the debounce.
    ///
    /// Returns the written changes, or `None` if nothing was pending. On
    /// failure the snapshot is left as it was and the diff stays pending.
    pub async fn flush(&self) -> StoreResult<Option<ChangeSet>> {
        {
            let mut state = self.inner.state.lock().await;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
        }
        self.inner.write_pending().await
    }

    /// Whether a reconciled diff is waiting to be written.
    pub async fn pending(&self) -> bool {
        self.inner.state.lock().await.pending.is_some()
    }

    /// Number of ids in the persisted snapshot.
    pub async fn snapshot_len(&self) -> usize {
        self.inner.state.lock().await.snapshot.len()
    }

    /// Receives every change set after it has been written.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.inner.changes.subscribe()
    }

    /// Reads back every persisted torrent.
    pub async fn torrents(&self) -> StoreResult<Vec<CanonicalTorrent>> {
        let persistence = self.inner.persistence.clone();
        tokio::task::spawn_blocking(move || persistence.load_all())
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

impl StoreInner {
    async fn write_pending(&self) -> StoreResult<Option<ChangeSet>> {
        let _write = self.write_lock.lock().await;
        let Some(pending) = self.state.lock().await.pending.take() else {
            return Ok(None);
        };

        let bulk = pending.changes.len() > self.config.bulk_threshold;
        if bulk {
            info!(
                "{} changes exceed bulk threshold {}, replacing store",
                pending.changes.len(),
                self.config.bulk_threshold
            );
        }

        let persistence = self.persistence.clone();
        let (pending, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = if bulk {
                persistence.replace_all(&pending.torrents)
            } else {
                persistence.apply_changes(&pending.changes.upserted, &pending.changes.removed)
            };
            (pending, outcome)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?;

        let mut state = self.state.lock().await;
        if let Err(e) = outcome {
            // Keep the diff for the next flush unless a newer reconcile replaced it.
            if state.pending.is_none() {
                state.pending = Some(pending);
            }
            return Err(e);
        }

        let PendingWrite {
            signatures, changes, ..
        } = pending;
        let current = &mut *state;
        current.snapshot = signatures;
        // A reconcile that landed during the write was diffed against the old
        // snapshot.
        if let Some(next) = current.pending.as_mut() {
            next.rediff(&current.snapshot);
        }
        drop(state);

        debug!(
            "wrote {} upserts, {} removals",
            changes.upserted.len(),
            changes.removed.len()
        );
        let _ = self.changes.send(changes.clone());
        Ok(Some(changes))
    }
}
