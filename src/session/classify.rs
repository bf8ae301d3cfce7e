//! Filters deriving the visible and message-only subsequences of a log.

use super::entry::{MessageEntry, SessionEntry, SessionHeader};

/// Every entry except structural `session` headers, in log order.
///
/// Unknown record kinds stay visible; their ids still participate in read
/// tracking even though nothing is rendered for them.
#[must_use]
pub fn visible_entries(entries: &[SessionEntry]) -> Vec<&SessionEntry> {
    entries.iter().filter(|e| !e.is_structural()).collect()
}

/// Only the `message` entries, in log order.
#[must_use]
pub fn message_entries(entries: &[SessionEntry]) -> Vec<&MessageEntry> {
    entries.iter().filter_map(SessionEntry::as_message).collect()
}

/// The first structural `session` header in the log, if any.
#[must_use]
pub fn session_header(entries: &[SessionEntry]) -> Option<&SessionHeader> {
    entries.iter().find_map(|entry| match entry {
        SessionEntry::Session(header) => Some(header),
        _ => None,
    })
}
