//! Session log model: typed records, tolerant parsing, classification.

mod classify;
mod entry;
mod parser;

pub use classify::{message_entries, session_header, visible_entries};
pub use entry::{
    CompactionEntry, ContentBlock, MessageBody, MessageEntry, ModelChangeEntry, Role, SessionEntry,
    SessionHeader, ThinkingLevelChangeEntry,
};
pub use parser::{parse_session_content, parse_session_file};
