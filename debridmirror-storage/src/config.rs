//! Local store configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Write batching settings for [`crate::LocalStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Quiet period after the last reconcile before the pending diff is written.
    pub debounce_ms: u64,

    /// Above this many combined upserts and removals, the whole store is
    /// replaced in one pass instead of row by row.
    pub bulk_threshold: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1_000,
            bulk_threshold: 400,
        }
    }
}

impl StoreConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
