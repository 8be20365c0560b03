//! TTL key/value cache for library snapshots.
//!
//! Values are stored as serialized bytes. Expired entries are dropped lazily
//! on lookup; [`CacheStore::purge_expired`] sweeps them in bulk.

use crate::error::MirrorResult;
use debridmirror_types::{Credential, ServiceTag};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One cached value.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Generic TTL cache.
pub struct CacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl CacheStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Cache key for one service account's library: `<tag>:library:<fingerprint>`.
    pub fn library_key(tag: ServiceTag, credential: &Credential) -> String {
        format!("{tag}:library:{}", credential.fingerprint())
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the value under `key`, or `None` if absent, expired, or not
    /// decodable as `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => {
                    return match serde_json::from_slice(&entry.value) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            warn!("cache entry {key} failed to decode: {e}");
                            None
                        }
                    };
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            debug!("cache entry {key} expired");
            entries.remove(key);
        }
        None
    }

    /// Stores `value` under `key` for `ttl`.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> MirrorResult<()> {
        let bytes = serde_json::to_vec(value)?;
        let entry = CacheEntry {
            key: key.to_string(),
            value: bytes,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    /// [`set`](Self::set) with the store's default TTL.
    pub async fn set_default<T: Serialize>(&self, key: &str, value: &T) -> MirrorResult<()> {
        self.set(key, value, self.default_ttl).await
    }

    /// Removes the given keys, or everything when `keys` is `None`.
    pub async fn clear(&self, keys: Option<&[String]>) {
        let mut entries = self.entries.write().await;
        match keys {
            None => entries.clear(),
            Some(keys) => {
                for key in keys {
                    entries.remove(key);
                }
            }
        }
    }

    /// Removes every key starting with `prefix`.
    pub async fn clear_prefix(&self, prefix: &str) {
        self.entries
            .write()
            .await
            .retain(|key, _| !key.starts_with(prefix));
    }

    /// Drops all expired entries and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until evicted.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
