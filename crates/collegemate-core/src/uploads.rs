//! Study material contributed by signed-in users

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::Clock;
use crate::store::{KeyValueStore, StoreError, KEY_UPLOADS};

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fields submitted from the upload form
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadDraft {
    pub semester: String,
    pub subject: String,
    pub name: String,
    pub file: String,
}

/// A stored upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    /// Milliseconds since the epoch at upload time
    pub id: i64,
    pub semester: String,
    pub subject: String,
    pub name: String,
    pub file: String,
    #[serde(default)]
    pub is_custom: bool,
}

/// Upload list over a [`KeyValueStore`]
pub struct UploadStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl UploadStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn list(&self) -> Result<Vec<Upload>, UploadError> {
        Ok(self.store.load_or_default(KEY_UPLOADS)?)
    }

    pub fn for_semester(&self, semester: &str) -> Result<Vec<Upload>, UploadError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|u| u.semester == semester)
            .collect())
    }

    pub fn add(&self, draft: UploadDraft) -> Result<Upload, UploadError> {
        for (field, value) in [
            ("semester", &draft.semester),
            ("subject", &draft.subject),
            ("name", &draft.name),
            ("file", &draft.file),
        ] {
            if value.trim().is_empty() {
                return Err(UploadError::MissingField(field));
            }
        }

        let mut uploads = self.list()?;

        // ids stay unique even when two uploads land in the same millisecond
        let mut id = self.clock.now().timestamp_millis();
        if let Some(max) = uploads.iter().map(|u| u.id).max() {
            id = id.max(max + 1);
        }

        let upload = Upload {
            id,
            semester: draft.semester,
            subject: draft.subject,
            name: draft.name,
            file: draft.file,
            is_custom: true,
        };
        uploads.push(upload.clone());
        self.store.save(KEY_UPLOADS, &uploads)?;

        info!(id, semester = %upload.semester, subject = %upload.subject, "upload added");
        Ok(upload)
    }
}
