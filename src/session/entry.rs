//! Typed records of a session log.

use serde::Deserialize;
use serde_json::Value;

/// One record from a session log, dispatched on its `type` field.
///
/// Records with a recognized kind decode into their typed form. Records with
/// a missing or unrecognized kind are kept as [`SessionEntry::Unknown`] so
/// they still occupy a position in the log and keep their id.
#[derive(Debug, Clone)]
pub enum SessionEntry {
    /// Structural header identifying the session; never rendered.
    Session(SessionHeader),
    /// A conversation message (user, assistant, or tool result).
    Message(MessageEntry),
    /// Marker left behind when earlier history was compacted away.
    Compaction(CompactionEntry),
    /// The active model changed at this point in the log.
    ModelChange(ModelChangeEntry),
    /// The thinking level changed at this point in the log.
    ThinkingLevelChange(ThinkingLevelChangeEntry),
    /// Record of a kind this tool does not know; raw value preserved.
    Unknown(Value),
}

impl SessionEntry {
    /// Decode a single parsed JSON record.
    ///
    /// # Errors
    ///
    /// Returns an error when the record claims a known kind but its payload
    /// does not match that kind's shape. Unrecognized kinds are not errors.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some("session") => serde_json::from_value(value).map(Self::Session),
            Some("message") => serde_json::from_value(value).map(Self::Message),
            Some("compaction") => serde_json::from_value(value).map(Self::Compaction),
            Some("model_change") => serde_json::from_value(value).map(Self::ModelChange),
            Some("thinking_level_change") => {
                serde_json::from_value(value).map(Self::ThinkingLevelChange)
            }
            _ => Ok(Self::Unknown(value)),
        }
    }

    /// The record's entry id, when it carries one.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Session(e) => e.id.as_deref(),
            Self::Message(e) => e.id.as_deref(),
            Self::Compaction(e) => e.id.as_deref(),
            Self::ModelChange(e) => e.id.as_deref(),
            Self::ThinkingLevelChange(e) => e.id.as_deref(),
            Self::Unknown(v) => v.get("id").and_then(Value::as_str),
        }
    }

    /// Whether this is the structural `session` header record.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Session(_))
    }

    /// The message payload, for `message` records.
    #[must_use]
    pub fn as_message(&self) -> Option<&MessageEntry> {
        match self {
            Self::Message(e) => Some(e),
            _ => None,
        }
    }
}

/// Header record carrying the session's identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHeader {
    #[serde(default)]
    pub id: Option<String>,
    /// Key under which other logs reference this session as a spawn target.
    #[serde(default)]
    pub session_key: Option<String>,
    /// Human-readable label for the session.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A conversation message record.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub message: MessageBody,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// The payload of a message record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    pub role: Role,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    /// Name of the tool that produced this result (`toolResult` role only).
    #[serde(default)]
    pub tool_name: Option<String>,
    /// Id of the tool call this result answers (`toolResult` role only).
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

impl MessageBody {
    /// Concatenated text of all plain-text content blocks.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The tool-call blocks of this message, in order.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ContentBlock> {
        self.content
            .iter()
            .filter(|block| matches!(block, ContentBlock::ToolCall { .. }))
    }
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    User,
    Assistant,
    ToolResult,
}

/// One block of message content, dispatched on its `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        #[serde(default)]
        text: String,
    },
    /// An invocation of a tool by the assistant.
    ToolCall {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: String,
        #[serde(default)]
        arguments: Value,
    },
    /// A reference back to the tool call this content answers.
    #[serde(rename_all = "camelCase")]
    ToolResult {
        #[serde(default)]
        tool_call_id: Option<String>,
        #[serde(default)]
        tool_name: Option<String>,
    },
    /// Block of a kind this tool does not render.
    #[serde(other)]
    Other,
}

/// Marker record left behind by history compaction.
#[derive(Debug, Clone, Deserialize)]
pub struct CompactionEntry {
    #[serde(default)]
    pub id: Option<String>,
    /// Summary of the history that was compacted away.
    #[serde(default)]
    pub summary: Option<String>,
}

/// Record of a model switch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelChangeEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
}

/// Record of a thinking-level switch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingLevelChangeEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub thinking_level: Option<String>,
}
