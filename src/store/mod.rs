//! Stored-file lifecycle: persistence of cleaned tables, keyed retrieval,
//! idempotent deletion, and the age-based sweep.

mod disk;
mod memory;

pub use disk::DiskFileStore;
pub use memory::InMemoryFileStore;

use crate::error::Result;
use crate::table::Table;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

/// Bookkeeping for one persisted cleaned table.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub path: PathBuf,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

/// Port over the cleaned-file store. The store exclusively owns entries and
/// their backing bytes; callers hold only opaque keys.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persists a cleaned table under a fresh opaque key and returns it.
    /// A key collision is a fatal internal error, never retried.
    async fn save(&self, table: &Table) -> Result<String>;

    /// Returns the stored bytes, or `NotFound` when the key is unknown or
    /// the backing file has gone away.
    async fn retrieve(&self, key: &str) -> Result<Vec<u8>>;

    /// Removes the mapping and backing bytes. Deleting an absent key is a
    /// no-op.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Whether the key currently maps to a stored entry.
    async fn contains(&self, key: &str) -> bool;

    /// Deletes every entry whose backing file is older than `max_age`;
    /// returns how many were removed. Tolerates files disappearing between
    /// listing and deletion.
    async fn sweep(&self, max_age: Duration) -> Result<usize>;
}

pub(crate) fn content_sha256(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
