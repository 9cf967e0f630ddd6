//! Modal chat view model.
//!
//! All mutation happens on the UI task: key events and driver events are
//! applied one at a time, and anything that needs I/O is handed back to the
//! caller as a [`ViewCommand`].

use super::editor::{InputAction, InputEditor};
use super::input_metrics::{wrap_input_lines, wrapped_height};
use crate::runtime::TurnEvent;
use crate::types::{ChatMessage, Role};
use crate::util::excerpt;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

const ACTIVITY_PREVIEW_CHARS: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    Command,
    Insert,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Normal => "NORMAL",
            Mode::Command => "COMMAND",
            Mode::Insert => "INSERT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    User,
    Assistant,
    Activity,
    Error,
    Info,
    Blank,
}

impl LineKind {
    fn prefix(self) -> &'static str {
        match self {
            LineKind::User => "> ",
            LineKind::Error => "! ",
            LineKind::Activity => "* ",
            LineKind::Assistant | LineKind::Info | LineKind::Blank => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub kind: LineKind,
    pub text: String,
}

/// Work the view asks its owner to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCommand {
    StartTurn(String),
    CancelTurn,
    ListThreads,
    NewThread,
    Quit,
}

#[derive(Debug, Default)]
pub struct ChatView {
    mode: Mode,
    editor: InputEditor,
    command_buffer: String,
    pending_g: bool,
    transcript: Vec<TranscriptEntry>,
    /// Wrapped height of each transcript entry at `viewport_width`.
    entry_rows: Vec<usize>,
    total_rows: usize,
    /// Index of the assistant entry the current stream appends to.
    streaming_entry: Option<usize>,
    messages: Vec<ChatMessage>,
    scroll: usize,
    follow: bool,
    viewport_width: usize,
    viewport_height: usize,
    busy: bool,
    should_quit: bool,
    model: String,
    thread_title: Option<String>,
}

impl ChatView {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            follow: true,
            viewport_width: 80,
            viewport_height: 20,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn editor(&self) -> &InputEditor {
        &self.editor
    }

    pub fn command_buffer(&self) -> &str {
        &self.command_buffer
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn set_thread_title(&mut self, title: Option<String>) {
        self.thread_title = title;
    }

    pub fn status_text(&self) -> String {
        let mut parts = vec![self.mode.label().to_string()];
        if self.busy {
            parts.push("● thinking".to_string());
        }
        parts.push(self.model.clone());
        parts.push(
            self.thread_title
                .clone()
                .unwrap_or_else(|| "new thread".to_string()),
        );
        let status = parts.join(" │ ");
        if self.mode == Mode::Command {
            format!(":{}    {status}", self.command_buffer)
        } else {
            status
        }
    }

    /// Called before each render with the transcript pane size.
    pub fn set_viewport(&mut self, width: usize, height: usize) {
        let width = width.max(1);
        if width != self.viewport_width {
            self.viewport_width = width;
            self.entry_rows = self
                .transcript
                .iter()
                .map(|entry| entry_height(entry, width))
                .collect();
            self.total_rows = self.entry_rows.iter().sum();
        }
        self.viewport_height = height.max(1);
        self.clamp_scroll();
    }

    /// Show a stored conversation.
    pub fn load_history(&mut self, messages: &[ChatMessage]) {
        self.clear_transcript();
        self.streaming_entry = None;
        self.messages = messages.to_vec();
        for message in messages {
            match message.role {
                Role::User => {
                    self.push_entry(LineKind::User, message.content.clone());
                }
                Role::Assistant if message.has_tool_calls() => {
                    for call in &message.tool_calls {
                        self.push_entry(
                            LineKind::Activity,
                            format!(
                                "{} {}",
                                call.name(),
                                excerpt(&call.function.arguments.to_string(), ACTIVITY_PREVIEW_CHARS)
                            ),
                        );
                    }
                }
                Role::Assistant => {
                    self.push_entry(LineKind::Assistant, message.content.clone());
                    self.push_entry(LineKind::Blank, String::new());
                }
                Role::Tool | Role::System => {}
            }
        }
        self.scroll_to_bottom();
    }

    pub fn reset(&mut self) {
        self.clear_transcript();
        self.messages.clear();
        self.streaming_entry = None;
        self.thread_title = None;
        self.scroll = 0;
        self.follow = true;
    }

    pub fn push_info(&mut self, text: impl Into<String>) {
        self.push_entry(LineKind::Info, text.into());
        self.scroll_to_bottom();
    }

    pub fn push_error(&mut self, text: impl Into<String>) {
        self.push_entry(LineKind::Error, text.into());
        self.scroll_to_bottom();
    }

    fn push_entry(&mut self, kind: LineKind, text: String) -> usize {
        let entry = TranscriptEntry { kind, text };
        let rows = entry_height(&entry, self.viewport_width);
        self.transcript.push(entry);
        self.entry_rows.push(rows);
        self.total_rows += rows;
        self.transcript.len() - 1
    }

    fn append_to_entry(&mut self, idx: usize, text: &str) {
        let Some(entry) = self.transcript.get_mut(idx) else {
            return;
        };
        entry.text.push_str(text);
        let rows = entry_height(entry, self.viewport_width);
        self.total_rows = self.total_rows - self.entry_rows[idx] + rows;
        self.entry_rows[idx] = rows;
    }

    fn clear_transcript(&mut self) {
        self.transcript.clear();
        self.entry_rows.clear();
        self.total_rows = 0;
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<ViewCommand> {
        match self.mode {
            Mode::Normal => self.handle_normal_key(key),
            Mode::Command => self.handle_command_key(key),
            Mode::Insert => self.handle_insert_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Option<ViewCommand> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let was_pending_g = std::mem::take(&mut self.pending_g);
        let half_page = (self.viewport_height / 2).max(1);

        match key.code {
            KeyCode::Char('c') if ctrl => return self.quit(),
            KeyCode::Char('d') if ctrl => self.scroll_down(half_page),
            KeyCode::Char('u') if ctrl => self.scroll_up(half_page),
            KeyCode::Char(':') => {
                self.command_buffer.clear();
                self.mode = Mode::Command;
            }
            KeyCode::Char('i') => self.mode = Mode::Insert,
            KeyCode::Char('j') | KeyCode::Down => self.scroll_down(1),
            KeyCode::Char('k') | KeyCode::Up => self.scroll_up(1),
            KeyCode::Char('G') => self.scroll_to_bottom(),
            KeyCode::Char('g') => {
                if was_pending_g {
                    self.scroll_to_top();
                } else {
                    self.pending_g = true;
                }
            }
            _ => {}
        }
        None
    }

    fn handle_command_key(&mut self, key: KeyEvent) -> Option<ViewCommand> {
        match key.code {
            KeyCode::Esc => {
                self.command_buffer.clear();
                self.mode = Mode::Normal;
                None
            }
            KeyCode::Enter => {
                let command = std::mem::take(&mut self.command_buffer);
                self.mode = Mode::Normal;
                match command.trim() {
                    "q" | "quit" | "q!" => self.quit(),
                    "threads" => Some(ViewCommand::ListThreads),
                    "new" if self.busy => {
                        self.push_error("a response is still streaming");
                        None
                    }
                    "new" => Some(ViewCommand::NewThread),
                    _ => None,
                }
            }
            KeyCode::Backspace => {
                if self.command_buffer.pop().is_none() {
                    self.mode = Mode::Normal;
                }
                None
            }
            KeyCode::Char(ch) => {
                self.command_buffer.push(ch);
                None
            }
            _ => None,
        }
    }

    fn handle_insert_key(&mut self, key: KeyEvent) -> Option<ViewCommand> {
        let plain_enter = key.code == KeyCode::Enter && !key.modifiers.contains(KeyModifiers::SHIFT);
        if plain_enter && self.busy {
            return None;
        }

        match self.editor.apply_key(key) {
            InputAction::None => None,
            InputAction::Blur => {
                self.mode = Mode::Normal;
                None
            }
            InputAction::Interrupt if self.busy => Some(ViewCommand::CancelTurn),
            InputAction::Interrupt => {
                self.editor.clear();
                None
            }
            InputAction::Submit(value) => Some(self.begin_turn(value)),
        }
    }

    pub fn handle_paste(&mut self, text: &str) {
        if self.mode == Mode::Insert {
            self.editor.insert_str(text);
        }
    }

    fn begin_turn(&mut self, value: String) -> ViewCommand {
        self.messages.push(ChatMessage::user(value.clone()));
        self.push_entry(LineKind::User, value.clone());
        self.streaming_entry = None;
        self.busy = true;
        self.scroll_to_bottom();
        ViewCommand::StartTurn(value)
    }

    fn quit(&mut self) -> Option<ViewCommand> {
        self.should_quit = true;
        Some(ViewCommand::Quit)
    }

    /// Apply one driver event.
    pub fn handle_turn_event(&mut self, event: TurnEvent) {
        match event {
            TurnEvent::Chunk(text) => {
                let idx = match self.streaming_entry {
                    Some(idx) => idx,
                    None => {
                        let idx = self.push_entry(LineKind::Assistant, String::new());
                        self.streaming_entry = Some(idx);
                        idx
                    }
                };
                self.append_to_entry(idx, &text);
            }
            TurnEvent::Activity(text) => {
                self.streaming_entry = None;
                self.push_entry(LineKind::Activity, text);
            }
            TurnEvent::Done => {
                let response = self
                    .streaming_entry
                    .take()
                    .map(|idx| self.transcript[idx].text.clone())
                    .unwrap_or_default();
                self.messages.push(ChatMessage::assistant(response));
                self.push_entry(LineKind::Blank, String::new());
                self.busy = false;
            }
            TurnEvent::Error(error) => {
                self.streaming_entry = None;
                if error.is_cancelled() {
                    self.push_entry(LineKind::Info, "(cancelled)".to_string());
                } else {
                    self.push_entry(LineKind::Error, error.to_string());
                }
                self.push_entry(LineKind::Blank, String::new());
                self.busy = false;
            }
        }
        self.scroll_to_bottom();
    }

    /// The transcript wrapped to the viewport width, one row per item.
    pub fn wrapped_lines(&self) -> Vec<(LineKind, String)> {
        let mut rows = Vec::with_capacity(self.total_rows);
        for entry in &self.transcript {
            push_wrapped(&mut rows, entry, self.viewport_width);
        }
        rows
    }

    /// The rows currently on screen. Only entries overlapping the window
    /// are wrapped.
    pub fn visible_lines(&self) -> Vec<(LineKind, String)> {
        let start = self.scroll;
        let end = start + self.viewport_height;
        let mut rows = Vec::new();
        let mut first_row = 0usize;
        for (entry, &height) in self.transcript.iter().zip(&self.entry_rows) {
            let next_row = first_row + height;
            if next_row > start && first_row < end {
                let mut wrapped = Vec::with_capacity(height);
                push_wrapped(&mut wrapped, entry, self.viewport_width);
                let skip = start.saturating_sub(first_row);
                let take = end.min(next_row) - first_row.max(start);
                rows.extend(wrapped.into_iter().skip(skip).take(take));
            }
            if next_row >= end {
                break;
            }
            first_row = next_row;
        }
        rows
    }

    pub fn max_scroll(&self) -> usize {
        self.total_rows.saturating_sub(self.viewport_height)
    }

    fn clamp_scroll(&mut self) {
        let max = self.max_scroll();
        if self.follow {
            self.scroll = max;
        } else {
            self.scroll = self.scroll.min(max);
        }
    }

    pub fn scroll_down(&mut self, rows: usize) {
        let max = self.max_scroll();
        self.scroll = (self.scroll + rows).min(max);
        self.follow = self.scroll == max;
    }

    pub fn scroll_up(&mut self, rows: usize) {
        self.scroll = self.scroll.saturating_sub(rows);
        self.follow = self.scroll == self.max_scroll();
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll = 0;
        self.follow = self.max_scroll() == 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.follow = true;
        self.scroll = self.max_scroll();
    }
}

fn body_width(kind: LineKind, width: usize) -> usize {
    width.saturating_sub(kind.prefix().len()).max(1)
}

fn entry_height(entry: &TranscriptEntry, width: usize) -> usize {
    wrapped_height(&entry.text, body_width(entry.kind, width))
}

fn push_wrapped(rows: &mut Vec<(LineKind, String)>, entry: &TranscriptEntry, width: usize) {
    let prefix = entry.kind.prefix();
    let indent = " ".repeat(prefix.len());
    for (idx, row) in wrap_input_lines(&entry.text, body_width(entry.kind, width))
        .into_iter()
        .enumerate()
    {
        let lead = if idx == 0 { prefix } else { indent.as_str() };
        rows.push((entry.kind, format!("{lead}{row}")));
    }
}
