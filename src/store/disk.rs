use super::{content_sha256, FileStore, StoredEntry};
use crate::error::{Result, ScrubError};
use crate::table::Table;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Scratch-directory store for cleaned tables. Entries live in an in-process
/// map guarded by a mutex; the lock is never held across file I/O.
pub struct DiskFileStore {
    root: PathBuf,
    entries: Arc<Mutex<HashMap<String, StoredEntry>>>,
}

impl DiskFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            entries: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry(&self, key: &str) -> Option<StoredEntry> {
        self.entries.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl FileStore for DiskFileStore {
    async fn save(&self, table: &Table) -> Result<String> {
        let bytes = table.to_csv_bytes()?;
        let key = Uuid::new_v4().simple().to_string();
        let path = self.root.join(format!("{key}.csv"));
        let entry = StoredEntry {
            path: path.clone(),
            sha256: content_sha256(&bytes),
            created_at: Utc::now(),
        };

        // Claim the key before touching the disk so a second save can never
        // observe a half-written entry.
        {
            let mut entries = self.entries.lock().unwrap();
            if entries.contains_key(&key) {
                return Err(ScrubError::Internal(format!(
                    "stored-file key collision on {key}"
                )));
            }
            entries.insert(key.clone(), entry);
        }

        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            self.entries.lock().unwrap().remove(&key);
            return Err(e.into());
        }

        metrics::counter!(crate::metrics::FILES_SAVED).increment(1);
        debug!(key = %key, bytes = bytes.len(), "saved cleaned file");
        Ok(key)
    }

    async fn retrieve(&self, key: &str) -> Result<Vec<u8>> {
        let entry = self
            .entry(key)
            .ok_or_else(|| ScrubError::NotFound(format!("no stored file for key {key}")))?;

        let bytes = match tokio::fs::read(&entry.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ScrubError::NotFound(format!(
                    "backing file for key {key} is gone"
                )))
            }
            Err(e) => return Err(e.into()),
        };

        if content_sha256(&bytes) != entry.sha256 {
            return Err(ScrubError::Internal(format!(
                "checksum mismatch for stored file {key}"
            )));
        }
        Ok(bytes)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let removed = self.entries.lock().unwrap().remove(key);
        let Some(entry) = removed else { return Ok(()) };

        match tokio::fs::remove_file(&entry.path).await {
            Ok(()) => {
                metrics::counter!(crate::metrics::FILES_DELETED).increment(1);
                debug!(key = %key, "deleted stored file");
                Ok(())
            }
            // Already gone counts as deleted
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    async fn sweep(&self, max_age: Duration) -> Result<usize> {
        // Snapshot under the lock, stat and delete without it, so a long
        // directory scan never starves request handlers.
        let snapshot: Vec<(String, PathBuf)> = {
            let entries = self.entries.lock().unwrap();
            entries
                .iter()
                .map(|(k, e)| (k.clone(), e.path.clone()))
                .collect()
        };

        let now = std::time::SystemTime::now();
        let mut deleted = 0usize;
        for (key, path) in snapshot {
            let modified = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta.modified()?,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    // Vanished between listing and stat; drop the mapping.
                    self.entries.lock().unwrap().remove(&key);
                    continue;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "sweep could not stat stored file");
                    continue;
                }
            };

            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age > max_age {
                self.delete(&key).await?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            metrics::counter!(crate::metrics::SWEEP_DELETED).increment(deleted as u64);
            info!(deleted, "sweep removed expired stored files");
        }
        Ok(deleted)
    }
}
