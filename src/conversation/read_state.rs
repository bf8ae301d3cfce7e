//! Read-position tracking against a stored watermark.

use std::collections::HashSet;

use crate::session::{MessageEntry, SessionEntry};

/// Read/unread position of one conversation, derived from its watermark.
///
/// All fields are recomputed from the log on every call; nothing here is
/// persisted except the watermark id itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadState {
    /// The watermark this state was computed against.
    pub watermark: Option<String>,
    /// Ids of the visible prefix up to and including the watermark entry.
    pub read_ids: HashSet<String>,
    /// 1-based position of the watermark among messages; 0 when the
    /// watermark is absent or not a message.
    pub read_messages: usize,
    /// Number of message entries in the log.
    pub total_messages: usize,
    /// Id of the message after which the "last read" marker belongs; `None`
    /// when the watermark is the newest message, so a marker at the very
    /// bottom is never shown.
    pub marker_after: Option<String>,
}

impl ReadState {
    /// Compute the read state from the classified subsequences of a log.
    ///
    /// A watermark that matches no visible entry counts for nothing: the
    /// read set stays empty and every message stays unread.
    #[must_use]
    pub fn compute(
        visible: &[&SessionEntry],
        messages: &[&MessageEntry],
        watermark: Option<&str>,
    ) -> Self {
        let total_messages = messages.len();

        let Some(watermark) = watermark else {
            return Self {
                total_messages,
                ..Self::default()
            };
        };

        let mut read_ids = HashSet::new();
        let mut found = false;
        for entry in visible {
            if let Some(id) = entry.id() {
                read_ids.insert(id.to_string());
                if id == watermark {
                    found = true;
                    break;
                }
            }
        }
        if !found {
            read_ids.clear();
        }

        let read_messages = messages
            .iter()
            .position(|m| m.id.as_deref() == Some(watermark))
            .map_or(0, |idx| idx + 1);

        let last_message_id = messages.last().and_then(|m| m.id.as_deref());
        let marker_after = (read_messages > 0 && last_message_id != Some(watermark))
            .then(|| watermark.to_string());

        Self {
            watermark: Some(watermark.to_string()),
            read_ids,
            read_messages,
            total_messages,
            marker_after,
        }
    }

    /// Messages beyond the watermark; never negative.
    #[must_use]
    pub fn unread_messages(&self) -> usize {
        self.total_messages.saturating_sub(self.read_messages)
    }

    /// Whether the given entry id falls within the read prefix.
    #[must_use]
    pub fn is_read(&self, id: &str) -> bool {
        self.read_ids.contains(id)
    }
}
