//! Correlation of spawn tool results with the conversations they created.

use std::collections::HashMap;

use serde::Deserialize;

use crate::registry::SpawnRegistry;
use crate::session::{ContentBlock, Role, SessionEntry};

/// A nested conversation discovered behind a spawn tool result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRef {
    /// Session key of the child conversation.
    pub child_key: String,
    /// Log filename the key resolves to, from the registry.
    pub filename: String,
    /// Display label, from the registry.
    pub label: String,
    /// Task description recovered from the originating tool call; empty when
    /// the call cannot be found.
    pub task: String,
}

/// Payload a spawn tool reports on success.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpawnPayload {
    #[serde(default)]
    child_session_key: Option<String>,
}

/// Map spawn tool-result entries to the conversations they created.
///
/// Only `toolResult` messages whose tool name equals `spawn_tool` and that
/// carry an entry id are considered. The result text must decode to a JSON
/// payload naming a registered child session key; anything else simply yields
/// no mapping for that entry. Each mapping also carries the task description
/// from the assistant tool call with the matching call id, when one exists.
#[must_use]
pub fn correlate_spawns(
    entries: &[SessionEntry],
    spawn_tool: &str,
    registry: &SpawnRegistry,
) -> HashMap<String, SpawnRef> {
    let tasks = task_index(entries);
    let mut refs = HashMap::new();

    for entry in entries {
        let Some(message) = entry.as_message() else {
            continue;
        };
        if message.message.role != Role::ToolResult
            || message.message.tool_name.as_deref() != Some(spawn_tool)
        {
            continue;
        }
        let Some(id) = message.id.as_deref() else {
            continue;
        };

        let text = message.message.text();
        let Ok(payload) = serde_json::from_str::<SpawnPayload>(&text) else {
            tracing::debug!(entry = id, "Spawn result payload did not decode");
            continue;
        };
        let Some(child_key) = payload.child_session_key else {
            continue;
        };
        let Some(registered) = registry.get(&child_key) else {
            tracing::debug!(entry = id, key = %child_key, "Spawned conversation not registered");
            continue;
        };

        let task = message
            .message
            .tool_call_id
            .as_deref()
            .and_then(|call_id| tasks.get(call_id))
            .cloned()
            .unwrap_or_default();

        refs.insert(
            id.to_string(),
            SpawnRef {
                child_key,
                filename: registered.filename.clone(),
                label: registered.label.clone(),
                task,
            },
        );
    }

    refs
}

/// Index assistant tool-call ids to their `task` argument.
fn task_index(entries: &[SessionEntry]) -> HashMap<String, String> {
    let mut tasks = HashMap::new();
    for entry in entries {
        let Some(message) = entry.as_message() else {
            continue;
        };
        if message.message.role != Role::Assistant {
            continue;
        }
        for block in &message.message.content {
            if let ContentBlock::ToolCall {
                id: Some(call_id),
                arguments,
                ..
            } = block
            {
                let task = arguments
                    .get("task")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                tasks.insert(call_id.clone(), task.to_string());
            }
        }
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SpawnedConversation;
    use crate::session::parse_session_content;

    fn registry_with_child() -> SpawnRegistry {
        let mut registry = SpawnRegistry::new();
        registry.insert(
            "child-1",
            SpawnedConversation {
                filename: "child-1.jsonl".to_string(),
                label: "Child task".to_string(),
            },
        );
        registry
    }

    const SPAWN_LOG: &str = r#"{"type":"session","sessionKey":"parent-1"}
{"id":"a1","type":"message","message":{"role":"assistant","content":[{"type":"text","text":"Spawning"},{"type":"toolCall","id":"call-1","name":"sessions_spawn","arguments":{"task":"Summarize the build failure"}}]}}
{"id":"r1","type":"message","message":{"role":"toolResult","toolName":"sessions_spawn","toolCallId":"call-1","content":[{"type":"text","text":"{\"childSessionKey\":\"child-1\"}"}]}}"#;

    #[test]
    fn test_correlates_registered_spawn() {
        let entries = parse_session_content(SPAWN_LOG);
        let refs = correlate_spawns(&entries, "sessions_spawn", &registry_with_child());

        assert_eq!(refs.len(), 1);
        let spawn = refs.get("r1").expect("spawn ref for r1");
        assert_eq!(spawn.child_key, "child-1");
        assert_eq!(spawn.filename, "child-1.jsonl");
        assert_eq!(spawn.label, "Child task");
        assert_eq!(spawn.task, "Summarize the build failure");
    }

    #[test]
    fn test_unregistered_key_yields_nothing() {
        let entries = parse_session_content(SPAWN_LOG);
        let refs = correlate_spawns(&entries, "sessions_spawn", &SpawnRegistry::new());
        assert!(refs.is_empty());
    }

    #[test]
    fn test_other_tool_results_ignored() {
        let log = r#"{"id":"r1","type":"message","message":{"role":"toolResult","toolName":"bash","toolCallId":"call-1","content":[{"type":"text","text":"{\"childSessionKey\":\"child-1\"}"}]}}"#;
        let entries = parse_session_content(log);
        let refs = correlate_spawns(&entries, "sessions_spawn", &registry_with_child());
        assert!(refs.is_empty());
    }

    #[test]
    fn test_malformed_payload_yields_nothing() {
        let log = r#"{"id":"r1","type":"message","message":{"role":"toolResult","toolName":"sessions_spawn","toolCallId":"call-1","content":[{"type":"text","text":"spawn failed: quota"}]}}"#;
        let entries = parse_session_content(log);
        let refs = correlate_spawns(&entries, "sessions_spawn", &registry_with_child());
        assert!(refs.is_empty());
    }

    #[test]
    fn test_result_without_entry_id_skipped() {
        let log = r#"{"type":"message","message":{"role":"toolResult","toolName":"sessions_spawn","toolCallId":"call-1","content":[{"type":"text","text":"{\"childSessionKey\":\"child-1\"}"}]}}"#;
        let entries = parse_session_content(log);
        let refs = correlate_spawns(&entries, "sessions_spawn", &registry_with_child());
        assert!(refs.is_empty());
    }

    #[test]
    fn test_missing_call_id_gives_empty_task() {
        let log = r#"{"id":"r1","type":"message","message":{"role":"toolResult","toolName":"sessions_spawn","content":[{"type":"text","text":"{\"childSessionKey\":\"child-1\"}"}]}}"#;
        let entries = parse_session_content(log);
        let refs = correlate_spawns(&entries, "sessions_spawn", &registry_with_child());

        assert_eq!(refs.get("r1").expect("spawn ref").task, "");
    }

    #[test]
    fn test_payload_split_across_text_blocks() {
        let log = r#"{"id":"r1","type":"message","message":{"role":"toolResult","toolName":"sessions_spawn","toolCallId":"call-1","content":[{"type":"text","text":"{\"childSessionKey\":"},{"type":"text","text":"\"child-1\"}"}]}}"#;
        let entries = parse_session_content(log);
        let refs = correlate_spawns(&entries, "sessions_spawn", &registry_with_child());

        assert_eq!(refs.get("r1").expect("spawn ref").child_key, "child-1");
    }

    #[test]
    fn test_configured_spawn_tool_name() {
        let entries = parse_session_content(SPAWN_LOG);
        let refs = correlate_spawns(&entries, "agents_fork", &registry_with_child());
        assert!(refs.is_empty());
    }

    #[test]
    fn test_task_index_covers_multiple_calls() {
        let log = r#"{"id":"a1","type":"message","message":{"role":"assistant","content":[{"type":"toolCall","id":"c1","name":"sessions_spawn","arguments":{"task":"first"}},{"type":"toolCall","id":"c2","name":"sessions_spawn","arguments":{"task":"second"}}]}}"#;
        let entries = parse_session_content(log);
        let tasks = task_index(&entries);

        assert_eq!(tasks.get("c1").map(String::as_str), Some("first"));
        assert_eq!(tasks.get("c2").map(String::as_str), Some("second"));
    }
}
