//! Retrieval of raw session log content by name.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from fetching or listing session logs.
#[derive(Debug, Error)]
pub enum SourceError {
    /// No log exists under the given name.
    #[error("session log not found: {0}")]
    NotFound(String),
    /// The name is not a bare file name.
    #[error("invalid session log name: {0}")]
    InvalidName(String),
    /// Underlying I/O failure.
    #[error("failed to read session log {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Provider of raw log content, keyed by log filename.
///
/// The resolver only ever asks for content through this trait, so tests and
/// future transports can substitute their own lookup.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Fetch the raw text of the named log.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotFound`] for unknown names and
    /// [`SourceError::Io`] for underlying read failures.
    async fn fetch(&self, name: &str) -> Result<String, SourceError>;
}

/// Session source reading `*.jsonl` files from a single directory.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    /// Create a source rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory this source reads from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List log filenames in the root, sorted by name.
    ///
    /// Subdirectories and files without a `.jsonl` extension are ignored;
    /// the listing does not recurse.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub async fn list(&self) -> Result<Vec<String>, SourceError> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| self.io_error(e))?;

        let mut names = Vec::new();
        while let Some(dirent) = dir.next_entry().await.map_err(|e| self.io_error(e))? {
            let file_type = dirent.file_type().await.map_err(|e| self.io_error(e))?;
            if !file_type.is_file() {
                continue;
            }
            let path = dirent.path();
            if path.extension().and_then(OsStr::to_str) != Some("jsonl") {
                continue;
            }
            if let Some(name) = path.file_name().and_then(OsStr::to_str) {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    fn io_error(&self, source: io::Error) -> SourceError {
        SourceError::Io {
            name: self.root.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl SessionSource for DirSource {
    async fn fetch(&self, name: &str) -> Result<String, SourceError> {
        // Names come from log content, so refuse anything that could step
        // outside the session directory.
        if Path::new(name).file_name() != Some(OsStr::new(name)) {
            return Err(SourceError::InvalidName(name.to_string()));
        }

        match tokio::fs::read_to_string(self.root.join(name)).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(SourceError::NotFound(name.to_string()))
            }
            Err(e) => Err(SourceError::Io {
                name: name.to_string(),
                source: e,
            }),
        }
    }
}
