//! Rendering seam and the terminal renderer for resolved conversations.
//!
//! [`walk`] drives a resolved view tree through an [`EntryRenderer`] in
//! display order; the renderer decides what each callback looks like.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use owo_colors::{OwoColorize, Style};

use crate::conversation::{ConversationView, LoadPhase, ReadState, ResolveInputs};
use crate::danger::DangerHit;
use crate::session::{ContentBlock, MessageEntry, Role, SessionEntry};

/// Per-entry flags handed to a renderer alongside the entry itself.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Whether the entry falls within the read prefix.
    pub is_read: bool,
    /// Danger findings for the containing log.
    pub dangers: &'a [DangerHit],
    /// Nesting depth of the containing conversation (root = 0).
    pub depth: usize,
    /// Progress key of the containing log, for mark-as-read actions.
    pub log_key: &'a str,
    /// The ambient expand instruction the walk was driven with.
    pub ambient: bool,
}

/// Presentation seam: receives the composed view tree in display order.
pub trait EntryRenderer {
    /// Called before a conversation's entries, with its computed read state.
    /// Fires for collapsed and failed views too; they just get no entries.
    fn conversation_start(&mut self, view: &ConversationView, state: &ReadState, depth: usize);

    /// Called for each visible entry, in log order.
    fn entry(&mut self, entry: &SessionEntry, ctx: &RenderContext<'_>);

    /// Called where the "last read" marker belongs.
    fn read_marker(&mut self, read_at: Option<DateTime<Utc>>, depth: usize);

    /// Called for an expanded view whose fetch is still in flight.
    fn loading(&mut self, view: &ConversationView, depth: usize);

    /// Called after a conversation's entries.
    fn conversation_end(&mut self, view: &ConversationView, depth: usize);
}

/// Drive a resolved view tree through a renderer in display order.
///
/// Each entry that spawned a conversation is followed immediately by that
/// conversation's view, and the read marker lands right after the watermark
/// message. Collapsed views contribute only their header callbacks.
pub fn walk(
    view: &ConversationView,
    inputs: &ResolveInputs,
    ambient: bool,
    renderer: &mut dyn EntryRenderer,
) {
    walk_at(view, inputs, ambient, renderer, 0);
}

fn walk_at(
    view: &ConversationView,
    inputs: &ResolveInputs,
    ambient: bool,
    renderer: &mut dyn EntryRenderer,
    depth: usize,
) {
    let state = view.read_state(inputs);
    renderer.conversation_start(view, &state, depth);

    if view.is_expanded(ambient) {
        match view.phase() {
            LoadPhase::Loading => renderer.loading(view, depth),
            LoadPhase::Loaded => {
                let dangers: &[DangerHit] = inputs
                    .dangers
                    .get(view.filename())
                    .map_or(&[], Vec::as_slice);
                let read_at = inputs
                    .progress
                    .get(view.key())
                    .and_then(|mark| mark.last_read_at);

                for entry in view.visible() {
                    let is_read = entry.id().is_some_and(|id| state.is_read(id));
                    let ctx = RenderContext {
                        is_read,
                        dangers,
                        depth,
                        log_key: view.key(),
                        ambient,
                    };
                    renderer.entry(entry, &ctx);

                    let Some(id) = entry.id() else {
                        continue;
                    };
                    if let Some(child) = view.child(id) {
                        walk_at(child, inputs, ambient, renderer, depth + 1);
                    }
                    if state.marker_after.as_deref() == Some(id) {
                        renderer.read_marker(read_at, depth);
                    }
                }
            }
            LoadPhase::NotLoaded | LoadPhase::Failed => {}
        }
    }

    renderer.conversation_end(view, depth);
}

/// Terminal renderer producing indented, optionally colored lines.
pub struct TextRenderer<W> {
    out: W,
    plain: bool,
}

impl TextRenderer<io::Stdout> {
    /// Renderer writing to stdout.
    #[must_use]
    pub fn stdout(plain: bool) -> Self {
        Self::new(io::stdout(), plain)
    }
}

impl<W: Write> TextRenderer<W> {
    /// Renderer writing to the given sink. With `plain` set, no color
    /// escapes are emitted.
    pub fn new(out: W, plain: bool) -> Self {
        Self { out, plain }
    }

    /// Consume the renderer and return its sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn indent(depth: usize) -> String {
        "  ".repeat(depth)
    }

    fn styled(&self, text: &str, style: Style) -> String {
        if self.plain {
            text.to_string()
        } else {
            text.style(style).to_string()
        }
    }

    fn fade(&self, text: &str, is_read: bool) -> String {
        if is_read {
            self.styled(text, Style::new().dimmed())
        } else {
            text.to_string()
        }
    }

    fn write_message(&mut self, indent: &str, entry: &MessageEntry, ctx: &RenderContext<'_>) {
        let body = &entry.message;
        match body.role {
            Role::User => {
                let tag = self.styled("[user]", Style::new().cyan().bold());
                let text = self.fade(&truncate(&body.text(), 200), ctx.is_read);
                let _ = writeln!(self.out, "{indent}{tag} {text}");
            }
            Role::Assistant => {
                let text = body.text();
                if !text.is_empty() {
                    let tag = self.styled("[assistant]", Style::new().magenta().bold());
                    let text = self.fade(&truncate(&text, 200), ctx.is_read);
                    let _ = writeln!(self.out, "{indent}{tag} {text}");
                }
                for block in body.tool_calls() {
                    if let ContentBlock::ToolCall {
                        name, arguments, ..
                    } = block
                    {
                        let tag = self.styled("[tool]", Style::new().cyan());
                        let args = self.fade(&format_arguments(arguments), ctx.is_read);
                        let _ = writeln!(self.out, "{indent}{tag} {name} {args}");
                    }
                }
            }
            Role::ToolResult => {
                let tag = self.styled("[result]", Style::new().green());
                let tool = body.tool_name.as_deref().unwrap_or("tool");
                let text = self.fade(&truncate(&body.text(), 200), ctx.is_read);
                let _ = writeln!(self.out, "{indent}{tag} {tool}: {text}");
            }
        }
    }

    fn write_dangers(&mut self, entry: &SessionEntry, ctx: &RenderContext<'_>) {
        let Some(id) = entry.id() else {
            return;
        };
        let indent = Self::indent(ctx.depth);
        for hit in ctx
            .dangers
            .iter()
            .filter(|hit| hit.entry_id.as_deref() == Some(id))
        {
            let tag = self.styled("[danger]", Style::new().red().bold());
            let _ = writeln!(
                self.out,
                "{indent}{tag} {}: {}",
                hit.description,
                truncate(&hit.excerpt, 80)
            );
        }
    }
}

impl<W: Write> EntryRenderer for TextRenderer<W> {
    fn conversation_start(&mut self, view: &ConversationView, state: &ReadState, depth: usize) {
        let indent = Self::indent(depth);
        let tag = self.styled("[session]", Style::new().blue().bold());
        let _ = writeln!(
            self.out,
            "{indent}{tag} {} ({} msgs, {} unread)",
            view.display_label(),
            state.total_messages,
            state.unread_messages()
        );
    }

    fn entry(&mut self, entry: &SessionEntry, ctx: &RenderContext<'_>) {
        let indent = Self::indent(ctx.depth);
        match entry {
            SessionEntry::Message(message) => self.write_message(&indent, message, ctx),
            SessionEntry::Compaction(compaction) => {
                let tag = self.styled("[compaction]", Style::new().yellow().bold());
                let summary = truncate(compaction.summary.as_deref().unwrap_or(""), 100);
                let _ = writeln!(self.out, "{indent}{tag} {summary}");
            }
            SessionEntry::ModelChange(change) => {
                let tag = self.styled("[model]", Style::new().blue());
                let model = change.model_id.as_deref().unwrap_or("unknown");
                let _ = writeln!(self.out, "{indent}{tag} -> {model}");
            }
            SessionEntry::ThinkingLevelChange(change) => {
                let tag = self.styled("[thinking]", Style::new().blue());
                let level = change.thinking_level.as_deref().unwrap_or("unknown");
                let _ = writeln!(self.out, "{indent}{tag} -> {level}");
            }
            // Headers never reach here; unknown kinds occupy a position but
            // render nothing.
            SessionEntry::Session(_) | SessionEntry::Unknown(_) => {}
        }
        self.write_dangers(entry, ctx);
    }

    fn read_marker(&mut self, read_at: Option<DateTime<Utc>>, depth: usize) {
        let indent = Self::indent(depth);
        let when = read_at.map_or_else(String::new, |at| {
            format!(" {}", at.format("%Y-%m-%d %H:%M UTC"))
        });
        let line = self.styled(&format!("-- last read{when} --"), Style::new().dimmed());
        let _ = writeln!(self.out, "{indent}{line}");
    }

    fn loading(&mut self, _view: &ConversationView, depth: usize) {
        let indent = Self::indent(depth);
        let line = self.styled("loading...", Style::new().dimmed());
        let _ = writeln!(self.out, "{indent}{line}");
    }

    fn conversation_end(&mut self, _view: &ConversationView, _depth: usize) {}
}

/// Render tool arguments as `key=value` pairs with long values elided.
#[must_use]
pub fn format_arguments(arguments: &serde_json::Value) -> String {
    match arguments {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => format!("{key}={}", truncate(s, 50)),
                other => format!("{key}={}", truncate(&other.to_string(), 50)),
            })
            .collect::<Vec<_>>()
            .join(", "),
        serde_json::Value::Null => String::new(),
        other => truncate(&other.to_string(), 80),
    }
}

/// Shorten a string to at most `max_chars` characters, appending an ellipsis
/// when something was cut.
#[must_use]
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars <= 3 {
        return "...".to_string();
    }
    let cut: String = s.chars().take(max_chars - 3).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::DirSource;
    use crate::danger::{scan_all, DangerRules};
    use crate::progress::{Progress, ReadMark};
    use crate::registry::{SpawnRegistry, SpawnedConversation};

    #[test]
    fn test_truncate_short_strings_unchanged() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
    }

    #[test]
    fn test_truncate_long_strings() {
        let result = truncate("this is a long string", 10);
        assert_eq!(result, "this is...");
        assert_eq!(result.chars().count(), 10);
    }

    #[test]
    fn test_truncate_tiny_limit() {
        assert_eq!(truncate("hello", 3), "...");
        assert_eq!(truncate("hello", 0), "...");
    }

    #[test]
    fn test_truncate_multibyte_safe() {
        let result = truncate("héllö wörld, quite löng indeed", 10);
        assert_eq!(result.chars().count(), 10);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_format_arguments_object() {
        let args = serde_json::json!({"command": "ls -la", "timeout": 30});
        let formatted = format_arguments(&args);
        assert!(formatted.contains("command=ls -la"));
        assert!(formatted.contains("timeout=30"));
    }

    #[test]
    fn test_format_arguments_null_and_scalar() {
        assert_eq!(format_arguments(&serde_json::Value::Null), "");
        assert_eq!(format_arguments(&serde_json::json!("raw")), "\"raw\"");
    }

    struct Recording {
        events: Vec<String>,
    }

    impl Recording {
        fn new() -> Self {
            Self { events: Vec::new() }
        }
    }

    impl EntryRenderer for Recording {
        fn conversation_start(&mut self, view: &ConversationView, _state: &ReadState, depth: usize) {
            self.events.push(format!("start:{}:{depth}", view.key()));
        }

        fn entry(&mut self, entry: &SessionEntry, ctx: &RenderContext<'_>) {
            let marker = if ctx.is_read { "read" } else { "unread" };
            self.events
                .push(format!("entry:{}:{marker}", entry.id().unwrap_or("-")));
        }

        fn read_marker(&mut self, _read_at: Option<DateTime<Utc>>, _depth: usize) {
            self.events.push("marker".to_string());
        }

        fn loading(&mut self, view: &ConversationView, _depth: usize) {
            self.events.push(format!("loading:{}", view.key()));
        }

        fn conversation_end(&mut self, view: &ConversationView, depth: usize) {
            self.events.push(format!("end:{}:{depth}", view.key()));
        }
    }

    const PARENT_LOG: &str = r#"{"type":"session","sessionKey":"parent-1"}
{"id":"m1","type":"message","message":{"role":"user","content":[{"type":"text","text":"go"}]}}
{"id":"a1","type":"message","message":{"role":"assistant","content":[{"type":"toolCall","id":"call-1","name":"sessions_spawn","arguments":{"task":"dig in"}}]}}
{"id":"r1","type":"message","message":{"role":"toolResult","toolName":"sessions_spawn","toolCallId":"call-1","content":[{"type":"text","text":"{\"childSessionKey\":\"child-1\"}"}]}}
{"id":"m2","type":"message","message":{"role":"assistant","content":[{"type":"text","text":"done"}]}}"#;

    const CHILD_LOG: &str = r#"{"type":"session","sessionKey":"child-1","label":"Child"}
{"id":"c1","type":"message","message":{"role":"user","content":[{"type":"text","text":"hi"}]}}"#;

    fn fixture_inputs(progress: Progress) -> ResolveInputs {
        let mut registry = SpawnRegistry::new();
        registry.insert(
            "child-1",
            SpawnedConversation {
                filename: "child.jsonl".to_string(),
                label: "Child".to_string(),
            },
        );
        ResolveInputs::new(registry, progress, crate::danger::DangerMap::new(), "sessions_spawn")
    }

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("parent.jsonl"), PARENT_LOG).expect("write parent");
        std::fs::write(dir.path().join("child.jsonl"), CHILD_LOG).expect("write child");
        dir
    }

    #[test]
    fn test_walk_nests_children_and_places_marker() {
        let dir = fixture_dir();
        let source = DirSource::new(dir.path());

        let mut progress = Progress::new();
        progress.insert(
            "parent.jsonl".to_string(),
            ReadMark {
                last_read_id: "a1".to_string(),
                last_read_at: None,
            },
        );
        let inputs = fixture_inputs(progress);

        let mut view = ConversationView::root("parent.jsonl");
        tokio_test::block_on(view.expand_all(&source, &inputs));

        let mut recording = Recording::new();
        walk(&view, &inputs, true, &mut recording);

        assert_eq!(
            recording.events,
            vec![
                "start:parent.jsonl:0",
                "entry:m1:read",
                "entry:a1:read",
                "marker",
                "entry:r1:unread",
                "start:child-1:1",
                "entry:c1:unread",
                "end:child-1:1",
                "entry:m2:unread",
                "end:parent.jsonl:0",
            ]
        );
    }

    #[test]
    fn test_walk_collapsed_child_is_header_only() {
        let dir = fixture_dir();
        let source = DirSource::new(dir.path());
        let inputs = fixture_inputs(Progress::new());

        let mut view = ConversationView::root("parent.jsonl");
        tokio_test::block_on(view.expand(&source, &inputs));
        view.set_expanded(true);

        let mut recording = Recording::new();
        walk(&view, &inputs, false, &mut recording);

        let child_events: Vec<_> = recording
            .events
            .iter()
            .filter(|e| e.contains("child-1"))
            .collect();
        assert_eq!(child_events, vec!["start:child-1:1", "end:child-1:1"]);
    }

    #[test]
    fn test_walk_collapsed_root_is_header_only() {
        let dir = fixture_dir();
        let source = DirSource::new(dir.path());
        let inputs = fixture_inputs(Progress::new());

        let mut view = ConversationView::root("parent.jsonl");
        tokio_test::block_on(view.expand(&source, &inputs));

        let mut recording = Recording::new();
        walk(&view, &inputs, false, &mut recording);

        assert_eq!(
            recording.events,
            vec!["start:parent.jsonl:0", "end:parent.jsonl:0"]
        );
    }

    #[test]
    fn test_text_renderer_plain_output() {
        let dir = fixture_dir();
        std::fs::write(
            dir.path().join("risky.jsonl"),
            r#"{"id":"a1","type":"message","message":{"role":"assistant","content":[{"type":"toolCall","name":"bash","arguments":{"command":"rm -rf /srv"}}]}}"#,
        )
        .expect("write risky");
        let source = DirSource::new(dir.path());

        let names = vec!["risky.jsonl".to_string()];
        let dangers = tokio_test::block_on(scan_all(
            &source,
            &names,
            &DangerRules::with_default_rules(),
        ));
        let inputs = ResolveInputs::new(
            SpawnRegistry::new(),
            Progress::new(),
            dangers,
            "sessions_spawn",
        );

        let mut view = ConversationView::root("risky.jsonl");
        tokio_test::block_on(view.expand(&source, &inputs));
        view.set_expanded(true);

        let mut renderer = TextRenderer::new(Vec::new(), true);
        walk(&view, &inputs, false, &mut renderer);
        let output = String::from_utf8(renderer.into_inner()).expect("utf8 output");

        assert!(output.contains("[session] risky.jsonl (1 msgs, 1 unread)"));
        assert!(output.contains("[tool] bash command=rm -rf /srv"));
        assert!(output.contains("[danger]"));
        assert!(!output.contains('\u{1b}'), "plain output must not contain escapes");
    }

    #[test]
    fn test_text_renderer_indents_nested_conversations() {
        let dir = fixture_dir();
        let source = DirSource::new(dir.path());
        let inputs = fixture_inputs(Progress::new());

        let mut view = ConversationView::root("parent.jsonl");
        tokio_test::block_on(view.expand_all(&source, &inputs));

        let mut renderer = TextRenderer::new(Vec::new(), true);
        walk(&view, &inputs, true, &mut renderer);
        let output = String::from_utf8(renderer.into_inner()).expect("utf8 output");

        assert!(output.contains("\n  [session] Child (1 msgs, 1 unread)"));
        assert!(output.contains("\n  [user] hi"));
    }
}
