//! Registry of spawned conversations discovered across the session directory.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::conversation::SessionSource;
use crate::session::{parse_session_content, session_header};

/// A spawned conversation registered under its session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnedConversation {
    /// Log filename the key resolves to.
    pub filename: String,
    /// Display label from the session header; empty when the header has none.
    pub label: String,
}

/// Mapping from child session key to its registered conversation.
///
/// Built once up front by [`SpawnRegistry::scan`]; correlation passes then
/// look keys up without touching the filesystem again.
#[derive(Debug, Clone, Default)]
pub struct SpawnRegistry {
    conversations: HashMap<String, SpawnedConversation>,
}

impl SpawnRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry by scanning every named log for a session header
    /// carrying a session key.
    ///
    /// Logs without a keyed header are simply not registered. Logs that fail
    /// to fetch are skipped with a warning; the scan itself never fails.
    pub async fn scan(source: &dyn SessionSource, names: &[String]) -> Self {
        let mut registry = Self::new();

        for name in names {
            let content = match source.fetch(name).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(log = %name, error = %e, "Skipping unreadable log during spawn scan");
                    continue;
                }
            };

            let entries = parse_session_content(&content);
            let Some(header) = session_header(&entries) else {
                continue;
            };
            let Some(key) = header.session_key.clone() else {
                continue;
            };

            tracing::debug!(log = %name, key = %key, "Registered spawned conversation");
            registry.insert(
                key,
                SpawnedConversation {
                    filename: name.clone(),
                    label: header.label.clone().unwrap_or_default(),
                },
            );
        }

        registry
    }

    /// Register a conversation under its key, replacing any previous entry.
    pub fn insert(&mut self, key: impl Into<String>, conversation: SpawnedConversation) {
        self.conversations.insert(key.into(), conversation);
    }

    /// Look up a conversation by session key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SpawnedConversation> {
        self.conversations.get(key)
    }

    /// Whether the key is registered.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.conversations.contains_key(key)
    }

    /// Iterate over registered `(key, conversation)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SpawnedConversation)> {
        self.conversations.iter()
    }

    /// Number of registered conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{DirSource, SourceError};
    use async_trait::async_trait;

    struct FailingSource;

    #[async_trait]
    impl SessionSource for FailingSource {
        async fn fetch(&self, name: &str) -> Result<String, SourceError> {
            Err(SourceError::NotFound(name.to_string()))
        }
    }

    #[tokio::test]
    async fn test_scan_registers_keyed_logs() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        tokio::fs::write(
            dir.path().join("child.jsonl"),
            "{\"type\":\"session\",\"sessionKey\":\"child-1\",\"label\":\"Fix flaky test\"}\n",
        )
        .await
        .expect("write");
        tokio::fs::write(
            dir.path().join("plain.jsonl"),
            "{\"id\":\"1\",\"type\":\"message\",\"message\":{\"role\":\"user\"}}\n",
        )
        .await
        .expect("write");

        let source = DirSource::new(dir.path());
        let names = source.list().await.expect("list");
        let registry = SpawnRegistry::scan(&source, &names).await;

        assert_eq!(registry.len(), 1);
        let registered = registry.get("child-1").expect("registered child");
        assert_eq!(registered.filename, "child.jsonl");
        assert_eq!(registered.label, "Fix flaky test");
    }

    #[tokio::test]
    async fn test_scan_defaults_missing_label() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        tokio::fs::write(
            dir.path().join("child.jsonl"),
            "{\"type\":\"session\",\"sessionKey\":\"child-2\"}\n",
        )
        .await
        .expect("write");

        let source = DirSource::new(dir.path());
        let registry = SpawnRegistry::scan(&source, &["child.jsonl".to_string()]).await;

        assert_eq!(registry.get("child-2").expect("registered").label, "");
    }

    #[tokio::test]
    async fn test_scan_skips_unreadable_logs() {
        let registry = SpawnRegistry::scan(&FailingSource, &["gone.jsonl".to_string()]).await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_scan_ignores_headerless_logs() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        tokio::fs::write(
            dir.path().join("keyless.jsonl"),
            "{\"type\":\"session\",\"label\":\"No key\"}\n",
        )
        .await
        .expect("write");

        let source = DirSource::new(dir.path());
        let registry = SpawnRegistry::scan(&source, &["keyless.jsonl".to_string()]).await;
        assert!(registry.is_empty());
    }

    #[test]
    fn test_insert_replaces() {
        let mut registry = SpawnRegistry::new();
        registry.insert(
            "k",
            SpawnedConversation {
                filename: "old.jsonl".to_string(),
                label: String::new(),
            },
        );
        registry.insert(
            "k",
            SpawnedConversation {
                filename: "new.jsonl".to_string(),
                label: String::new(),
            },
        );

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("k").expect("entry").filename, "new.jsonl");
        assert!(registry.contains("k"));
    }
}
