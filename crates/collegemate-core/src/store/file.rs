//! File-backed store
//!
//! All keys live in a single JSON object on disk. Each batch is applied to a
//! copy of the current document, written to a temp file and renamed over the
//! original, so a crash mid-write leaves the previous state intact.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;

use super::{apply_ops, KeyValueStore, StoreError, WriteBatch};

/// Storage file name inside the data directory
pub const STORE_FILE_NAME: &str = "storage.json";

/// Durable [`KeyValueStore`] persisted as one JSON document
#[derive(Debug)]
pub struct FileStore {
    /// Path to the JSON document
    path: PathBuf,
    /// Cached copy of the document
    entries: Mutex<BTreeMap<String, Value>>,
}

impl FileStore {
    /// Open (or lazily create) the store file inside `data_dir`
    pub fn open_dir(data_dir: &Path) -> Result<Self, StoreError> {
        Self::open(data_dir.join(STORE_FILE_NAME))
    }

    /// Open the store at an explicit file path
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entries = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
                    key: path.display().to_string(),
                    reason: e.to_string(),
                })?
            }
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), keys = entries.len(), "opened file store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(entries)?;

        // Write atomically; the temp file is owner-only before any data lands
        let temp_path = self.path.with_extension("json.tmp");
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            options.mode(0o600);
            // a leftover temp file keeps its old mode on open
            if temp_path.exists() {
                fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))?;
            }
        }

        let mut file = options.open(&temp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = entries.clone();
        apply_ops(&mut next, batch.into_ops());

        // Only swap the cache once the file is on disk
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}
