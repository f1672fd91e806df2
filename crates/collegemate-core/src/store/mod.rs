//! Persistent key-value storage
//!
//! Every durable piece of portal state lives behind [`KeyValueStore`]: a flat
//! mapping from string keys to JSON values. An absent key is a valid state and
//! always means "uninitialized"; callers fall back to a default instead of
//! treating it as a fault.
//!
//! Writes that must land together (the poll's count and voted flag, for
//! instance) go through a [`WriteBatch`], which backends apply as one unit.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Registered accounts (list)
pub const KEY_ACCOUNTS: &str = "collegemate_users";
/// Logged-in user snapshot
pub const KEY_SESSION: &str = "collegemate_session";
/// Poll tallies keyed by option label
pub const KEY_POLL_VOTES: &str = "collegemate_bunk_votes";
/// Set once this browser has voted for the current poll date
pub const KEY_POLL_VOTED_TODAY: &str = "collegemate_bunk_voted_today";
/// Local date (`YYYY-MM-DD`) the stored tallies belong to
pub const KEY_POLL_DATE: &str = "collegemate_bunk_poll_date";
/// User-contributed study material
pub const KEY_UPLOADS: &str = "collegemate_uploads";

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Stored value under '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// A single mutation inside a [`WriteBatch`]
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    Put { key: String, value: Value },
    Delete { key: String },
}

/// Ordered set of mutations applied as one unit
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a serialized value under `key`
    pub fn put<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.ops.push(WriteOp::Put {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    /// Queue removal of `key`
    pub fn delete(&mut self, key: &str) {
        self.ops.push(WriteOp::Delete {
            key: key.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Durable string-keyed JSON storage scoped to one portal installation
///
/// There is no cross-process coordination: one writer is assumed.
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value stored under `key`
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Apply every operation in `batch`, or none of them
    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Store a single raw value
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.apply(WriteBatch {
            ops: vec![WriteOp::Put {
                key: key.to_string(),
                value,
            }],
        })
    }

    /// Remove a single key
    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.apply(batch)
    }
}

impl dyn KeyValueStore {
    /// Read and decode the value under `key`, `None` if absent
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Read and decode the value under `key`, falling back to `T::default()`
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, StoreError> {
        Ok(self.load(key)?.unwrap_or_default())
    }

    /// Encode and store a single value
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.put(key, value)?;
        self.apply(batch)
    }
}

/// Apply `ops` to an in-memory map in order
pub(crate) fn apply_ops(map: &mut BTreeMap<String, Value>, ops: Vec<WriteOp>) {
    for op in ops {
        match op {
            WriteOp::Put { key, value } => {
                map.insert(key, value);
            }
            WriteOp::Delete { key } => {
                map.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_absent_key_loads_as_none() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let value: Option<Vec<String>> = store.load("missing").unwrap();
        assert!(value.is_none());

        let fallback: Vec<String> = store.load_or_default("missing").unwrap();
        assert!(fallback.is_empty());
    }

    #[test]
    fn test_corrupt_value_is_reported_with_key() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set("numbers", Value::String("not a list".into())).unwrap();

        let err = store.load::<Vec<u32>>("numbers").unwrap_err();
        match err {
            StoreError::Corrupt { key, .. } => assert_eq!(key, "numbers"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_batch_applies_in_order() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let mut batch = WriteBatch::new();
        batch.put("a", &1u32).unwrap();
        batch.put("a", &2u32).unwrap();
        batch.put("b", &true).unwrap();
        batch.delete("b");
        assert_eq!(batch.len(), 4);
        store.apply(batch).unwrap();

        assert_eq!(store.load::<u32>("a").unwrap(), Some(2));
        assert_eq!(store.load::<bool>("b").unwrap(), None);
    }
}
