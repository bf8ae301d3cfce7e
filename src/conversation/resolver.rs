//! Per-conversation orchestration: load a log, correlate its spawns, and
//! recurse into the conversations they created.

use std::collections::HashMap;

use futures_util::future::BoxFuture;

use crate::danger::DangerMap;
use crate::progress::Progress;
use crate::registry::SpawnRegistry;
use crate::session::{self, MessageEntry, SessionEntry};

use super::read_state::ReadState;
use super::source::SessionSource;
use super::spawn::{correlate_spawns, SpawnRef};

/// Load progress of one conversation view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPhase {
    /// Content has not been requested yet.
    #[default]
    NotLoaded,
    /// A fetch is in flight.
    Loading,
    /// Entries are parsed and cached.
    Loaded,
    /// The last fetch failed. Nothing retries on its own; the next expand
    /// request fetches again.
    Failed,
}

/// Shared read-only inputs for one resolution pass over a view tree.
#[derive(Debug, Clone)]
pub struct ResolveInputs {
    /// Known spawned conversations, keyed by child session key.
    pub registry: SpawnRegistry,
    /// Read watermarks, keyed by log key.
    pub progress: Progress,
    /// Danger findings, keyed by log filename.
    pub dangers: DangerMap,
    /// Tool name whose results mark a spawn.
    pub spawn_tool: String,
}

impl ResolveInputs {
    /// Bundle the scanned registries for a resolution pass.
    #[must_use]
    pub fn new(
        registry: SpawnRegistry,
        progress: Progress,
        dangers: DangerMap,
        spawn_tool: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            progress,
            dangers,
            spawn_tool: spawn_tool.into(),
        }
    }
}

/// One conversation's view state, including the views of any conversations
/// it spawned.
///
/// A view starts collapsed and empty. Expanding it fetches and parses the
/// log, correlates spawn results, and creates a collapsed child view behind
/// every correlated entry.
#[derive(Debug, Clone)]
pub struct ConversationView {
    key: String,
    filename: String,
    label: String,
    task: String,
    phase: LoadPhase,
    manual: Option<bool>,
    entries: Vec<SessionEntry>,
    spawns: HashMap<String, SpawnRef>,
    children: HashMap<String, ConversationView>,
}

impl ConversationView {
    /// Create a root view over a log file. Roots are keyed by filename.
    #[must_use]
    pub fn root(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        Self {
            key: filename.clone(),
            filename,
            label: String::new(),
            task: String::new(),
            phase: LoadPhase::NotLoaded,
            manual: None,
            entries: Vec::new(),
            spawns: HashMap::new(),
            children: HashMap::new(),
        }
    }

    fn from_spawn(spawn: &SpawnRef) -> Self {
        Self {
            key: spawn.child_key.clone(),
            filename: spawn.filename.clone(),
            label: spawn.label.clone(),
            task: spawn.task.clone(),
            phase: LoadPhase::NotLoaded,
            manual: None,
            entries: Vec::new(),
            spawns: HashMap::new(),
            children: HashMap::new(),
        }
    }

    /// Fetch and parse this view's log unless it is already loaded.
    ///
    /// Idempotent once loaded: the cached entries are kept and no fetch
    /// happens. A failed fetch parks the view in [`LoadPhase::Failed`]
    /// without propagating; calling expand again retries.
    pub async fn expand(
        &mut self,
        source: &dyn SessionSource,
        inputs: &ResolveInputs,
    ) -> LoadPhase {
        match self.phase {
            LoadPhase::Loaded | LoadPhase::Loading => return self.phase,
            LoadPhase::NotLoaded | LoadPhase::Failed => {}
        }

        self.phase = LoadPhase::Loading;
        match source.fetch(&self.filename).await {
            Ok(content) => {
                self.entries = session::parse_session_content(&content);
                self.spawns =
                    correlate_spawns(&self.entries, &inputs.spawn_tool, &inputs.registry);
                self.children = self
                    .spawns
                    .iter()
                    .map(|(entry_id, spawn)| (entry_id.clone(), Self::from_spawn(spawn)))
                    .collect();
                self.phase = LoadPhase::Loaded;
                tracing::debug!(
                    log = %self.filename,
                    entries = self.entries.len(),
                    spawns = self.spawns.len(),
                    "Loaded conversation"
                );
            }
            Err(e) => {
                tracing::warn!(log = %self.filename, error = %e, "Failed to load conversation log");
                self.phase = LoadPhase::Failed;
            }
        }
        self.phase
    }

    /// Expand this view and, recursively, every conversation beneath it.
    ///
    /// A child whose key already appears on its own ancestor chain is left
    /// collapsed, so a spawn cycle in the data cannot recurse forever.
    pub async fn expand_all(&mut self, source: &dyn SessionSource, inputs: &ResolveInputs) {
        let mut chain = Vec::new();
        self.expand_all_inner(source, inputs, &mut chain).await;
    }

    fn expand_all_inner<'a>(
        &'a mut self,
        source: &'a dyn SessionSource,
        inputs: &'a ResolveInputs,
        chain: &'a mut Vec<String>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if self.expand(source, inputs).await != LoadPhase::Loaded {
                return;
            }
            chain.push(self.key.clone());
            for child in self.children.values_mut() {
                if chain.contains(&child.key) {
                    tracing::warn!(key = %child.key, "Skipping cyclic spawn reference");
                    continue;
                }
                child.expand_all_inner(source, inputs, chain).await;
            }
            chain.pop();
        })
    }

    /// Whether the view counts as expanded, resolving the manual choice over
    /// the ambient expand-all instruction.
    #[must_use]
    pub fn is_expanded(&self, ambient: bool) -> bool {
        self.manual.unwrap_or(ambient)
    }

    /// Flip the expanded state, recording a manual choice. From then on the
    /// view no longer follows the ambient instruction.
    pub fn toggle(&mut self, ambient: bool) {
        self.manual = Some(!self.is_expanded(ambient));
    }

    /// Set the expanded state explicitly, recording a manual choice.
    pub fn set_expanded(&mut self, expanded: bool) {
        self.manual = Some(expanded);
    }

    /// The manual expand choice, if the user made one.
    #[must_use]
    pub fn manual_choice(&self) -> Option<bool> {
        self.manual
    }

    /// Progress key of this conversation (filename for roots, child session
    /// key for spawned conversations).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Filename of the backing log.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Registered label; empty for roots and unlabeled children.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Task description from the originating spawn call; empty for roots.
    #[must_use]
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Current load phase.
    #[must_use]
    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    /// Parsed entries; empty unless loaded.
    #[must_use]
    pub fn entries(&self) -> &[SessionEntry] {
        &self.entries
    }

    /// Correlated spawn references, keyed by the triggering entry id.
    #[must_use]
    pub fn spawn_refs(&self) -> &HashMap<String, SpawnRef> {
        &self.spawns
    }

    /// The child view behind the given entry id, if that entry spawned one.
    #[must_use]
    pub fn child(&self, entry_id: &str) -> Option<&ConversationView> {
        self.children.get(entry_id)
    }

    /// Mutable access to a child view, for toggling or expanding it.
    pub fn child_mut(&mut self, entry_id: &str) -> Option<&mut ConversationView> {
        self.children.get_mut(entry_id)
    }

    /// Entries in visible order (structural records removed).
    #[must_use]
    pub fn visible(&self) -> Vec<&SessionEntry> {
        session::visible_entries(&self.entries)
    }

    /// Message entries only, in log order.
    #[must_use]
    pub fn messages(&self) -> Vec<&MessageEntry> {
        session::message_entries(&self.entries)
    }

    /// Header label for display: the registered label, else the task
    /// shortened to sixty characters, else the log key.
    #[must_use]
    pub fn display_label(&self) -> String {
        if !self.label.is_empty() {
            return self.label.clone();
        }
        let task: String = self.task.chars().take(60).collect();
        if task.is_empty() {
            self.key.clone()
        } else {
            task
        }
    }

    /// Compute the current read state against the progress map.
    #[must_use]
    pub fn read_state(&self, inputs: &ResolveInputs) -> ReadState {
        let visible = self.visible();
        let messages = self.messages();
        let watermark = inputs
            .progress
            .get(&self.key)
            .map(|mark| mark.last_read_id.as_str());
        ReadState::compute(&visible, &messages, watermark)
    }
}
