//! Conversation reconstruction: spawn correlation, read tracking, and the
//! recursive view resolver.

mod read_state;
mod resolver;
mod source;
mod spawn;

pub use read_state::ReadState;
pub use resolver::{ConversationView, LoadPhase, ResolveInputs};
pub use source::{DirSource, SessionSource, SourceError};
pub use spawn::{correlate_spawns, SpawnRef};
