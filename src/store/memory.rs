use super::FileStore;
use crate::error::{Result, ScrubError};
use crate::table::Table;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// In-memory store for tests: same contract as the disk store, no
/// filesystem underneath.
pub struct InMemoryFileStore {
    entries: Arc<Mutex<HashMap<String, (Vec<u8>, Instant)>>>,
}

impl Default for InMemoryFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Test hook: register raw bytes under a chosen key.
    pub fn insert_raw(&self, key: &str, bytes: Vec<u8>) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes, Instant::now()));
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn save(&self, table: &Table) -> Result<String> {
        let bytes = table.to_csv_bytes()?;
        let key = Uuid::new_v4().simple().to_string();
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(&key) {
            return Err(ScrubError::Internal(format!(
                "stored-file key collision on {key}"
            )));
        }
        entries.insert(key.clone(), (bytes, Instant::now()));
        Ok(key)
    }

    async fn retrieve(&self, key: &str) -> Result<Vec<u8>> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| ScrubError::NotFound(format!("no stored file for key {key}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    async fn sweep(&self, max_age: Duration) -> Result<usize> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, (_, created)| created.elapsed() <= max_age);
        Ok(before - entries.len())
    }
}
