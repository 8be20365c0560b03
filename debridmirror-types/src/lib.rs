//! Shared types for the debridmirror library mirror.
//!
//! Every backend record is converted into a [`CanonicalTorrent`] before it
//! reaches the cache or the local store, so this crate is the one vocabulary
//! the sync engine and the store agree on.

mod service;
mod signature;
mod sync_result;
mod torrent;

pub use service::{Credential, ParseServiceTagError, ServiceTag};
pub use signature::{Signature, signature};
pub use sync_result::SyncResult;
pub use torrent::{CanonicalTorrent, MediaType, SelectedFile, TorrentStatus, compose_id};
