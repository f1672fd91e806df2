//! In-memory store for tests and throwaway sessions

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

use super::{apply_ops, KeyValueStore, StoreError, WriteBatch};

/// Volatile [`KeyValueStore`] backed by a map
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently set
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        apply_ops(&mut entries, batch.into_ops());
        Ok(())
    }
}
