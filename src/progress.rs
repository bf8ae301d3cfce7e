//! Persisted read watermarks, keyed by log key.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Watermark for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMark {
    /// Id of the last entry acknowledged as read.
    pub last_read_id: String,
    /// When the mark was recorded.
    #[serde(default)]
    pub last_read_at: Option<DateTime<Utc>>,
}

/// Watermarks for all conversations. Root logs are keyed by filename, nested
/// conversations by their child session key.
pub type Progress = HashMap<String, ReadMark>;

/// Errors that can occur when persisting progress.
#[derive(Debug, Error)]
pub enum ProgressError {
    /// Failed to write the progress file.
    #[error("Failed to write progress file: {0}")]
    WriteError(#[from] io::Error),
    /// Failed to serialize the watermark map.
    #[error("Failed to serialize progress: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// Store owning the watermark map and its backing JSON file.
#[derive(Debug)]
pub struct ProgressStore {
    marks: Progress,
    file_path: PathBuf,
}

impl ProgressStore {
    /// Default progress file location under the user's local data directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("session-review").join("progress.json")
    }

    /// Create an empty store backed by the given path.
    #[must_use]
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            marks: Progress::new(),
            file_path: path.into(),
        }
    }

    /// Load the store from disk.
    ///
    /// A missing file is normal on first run and yields an empty store, as
    /// does a corrupt one (with a warning); losing a watermark only makes
    /// entries show as unread again.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let file_path = path.into();
        let marks = match tokio::fs::read_to_string(&file_path).await {
            Ok(content) => match serde_json::from_str::<Progress>(&content) {
                Ok(marks) => {
                    tracing::debug!(count = marks.len(), "Loaded read progress");
                    marks
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Corrupt progress file, starting fresh");
                    Progress::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No progress file found, starting fresh");
                Progress::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read progress file, starting fresh");
                Progress::new()
            }
        };

        Self { marks, file_path }
    }

    /// Save the store to disk atomically (temp file, sync, rename).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub async fn save(&self) -> Result<(), ProgressError> {
        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&self.marks)?;

        let temp_path = self.file_path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_data().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.file_path).await?;
        tracing::debug!(
            path = %self.file_path.display(),
            count = self.marks.len(),
            "Saved read progress"
        );
        Ok(())
    }

    /// Record the watermark for a conversation at the current time, replacing
    /// any previous mark for the same key.
    pub fn mark_read(&mut self, key: impl Into<String>, entry_id: impl Into<String>) {
        self.marks.insert(
            key.into(),
            ReadMark {
                last_read_id: entry_id.into(),
                last_read_at: Some(Utc::now()),
            },
        );
    }

    /// The watermark for one log key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ReadMark> {
        self.marks.get(key)
    }

    /// The full watermark map.
    #[must_use]
    pub fn marks(&self) -> &Progress {
        &self.marks
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Number of stored watermarks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Whether no watermark is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}
