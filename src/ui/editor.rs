use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Clone, Debug, PartialEq, Eq)]
struct Snapshot {
    buffer: String,
    cursor: usize,
}

/// What the Insert-mode editor wants the view to do after a key.
#[derive(Debug, PartialEq, Eq)]
pub enum InputAction {
    None,
    Submit(String),
    /// `Ctrl-C`: cancel the running turn, or clear the input when idle.
    Interrupt,
    /// `Esc`: leave Insert mode.
    Blur,
}

/// Multi-line input buffer with submit history. `cursor` is a byte offset
/// that always sits on a char boundary.
#[derive(Default, Debug)]
pub struct InputEditor {
    buffer: String,
    cursor: usize,
    history: Vec<String>,
    history_index: Option<usize>,
    undo_stack: Vec<Snapshot>,
}

impl InputEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn clear(&mut self) {
        if !self.buffer.is_empty() {
            self.push_undo();
        }
        self.buffer.clear();
        self.cursor = 0;
        self.history_index = None;
    }

    fn clamp_left(&self, idx: usize) -> usize {
        let mut idx = idx.min(self.buffer.len());
        while idx > 0 && !self.buffer.is_char_boundary(idx) {
            idx -= 1;
        }
        idx
    }

    fn prev_boundary(&self, idx: usize) -> usize {
        let idx = self.clamp_left(idx);
        self.buffer[..idx]
            .char_indices()
            .next_back()
            .map(|(pos, _)| pos)
            .unwrap_or(0)
    }

    fn next_boundary(&self, idx: usize) -> usize {
        let idx = self.clamp_left(idx);
        match self.buffer[idx..].chars().next() {
            Some(ch) => idx + ch.len_utf8(),
            None => self.buffer.len(),
        }
    }

    fn push_undo(&mut self) {
        self.undo_stack.push(Snapshot {
            buffer: self.buffer.clone(),
            cursor: self.cursor,
        });
    }

    pub fn insert_str(&mut self, value: &str) {
        self.history_index = None;
        let cursor = self.clamp_left(self.cursor);
        self.push_undo();
        self.buffer.insert_str(cursor, value);
        self.cursor = cursor + value.len();
    }

    pub fn backspace(&mut self) {
        let end = self.clamp_left(self.cursor);
        if end == 0 {
            return;
        }
        self.history_index = None;
        let start = self.prev_boundary(end);
        self.push_undo();
        self.buffer.replace_range(start..end, "");
        self.cursor = start;
    }

    pub fn delete(&mut self) {
        let start = self.clamp_left(self.cursor);
        if start >= self.buffer.len() {
            return;
        }
        self.history_index = None;
        let end = self.next_boundary(start);
        self.push_undo();
        self.buffer.replace_range(start..end, "");
        self.cursor = start;
    }

    pub fn undo(&mut self) {
        if let Some(previous) = self.undo_stack.pop() {
            self.buffer = previous.buffer;
            self.cursor = self.clamp_left(previous.cursor);
        }
    }

    /// Take the buffer if it holds anything besides whitespace, recording it
    /// in the history.
    pub fn submit(&mut self) -> Option<String> {
        if self.buffer.trim().is_empty() {
            return None;
        }
        let value = self.buffer.trim_end_matches(['\n', '\r']).to_string();
        self.history.push(value.clone());
        self.history_index = None;
        self.undo_stack.clear();
        self.buffer.clear();
        self.cursor = 0;
        Some(value)
    }

    pub fn history_up(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let index = match self.history_index {
            Some(idx) => idx.saturating_sub(1),
            None => self.history.len() - 1,
        };
        self.show_history(index);
    }

    /// Walk towards newer entries; stepping past the newest clears the input.
    pub fn history_down(&mut self) {
        let Some(idx) = self.history_index else {
            return;
        };
        if idx + 1 >= self.history.len() {
            self.history_index = None;
            self.buffer.clear();
            self.cursor = 0;
        } else {
            self.show_history(idx + 1);
        }
    }

    fn show_history(&mut self, index: usize) {
        self.history_index = Some(index);
        self.buffer = self.history[index].clone();
        self.cursor = self.buffer.len();
    }

    pub fn apply_key(&mut self, key: KeyEvent) -> InputAction {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => return InputAction::Interrupt,
            KeyCode::Char('j') if ctrl => self.insert_str("\n"),
            KeyCode::Char('z') if ctrl => self.undo(),
            KeyCode::Char('a') if ctrl => self.cursor = 0,
            KeyCode::Char('e') if ctrl => self.cursor = self.buffer.len(),
            KeyCode::Enter if key.modifiers.contains(KeyModifiers::SHIFT) => self.insert_str("\n"),
            KeyCode::Enter => {
                if let Some(value) = self.submit() {
                    return InputAction::Submit(value);
                }
            }
            KeyCode::Esc => return InputAction::Blur,
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete(),
            KeyCode::Left => self.cursor = self.prev_boundary(self.cursor),
            KeyCode::Right => self.cursor = self.next_boundary(self.cursor),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.buffer.len(),
            KeyCode::Up => self.history_up(),
            KeyCode::Down => self.history_down(),
            KeyCode::Tab => self.insert_str("    "),
            KeyCode::Char(ch) if !ctrl => self.insert_str(ch.encode_utf8(&mut [0; 4])),
            _ => {}
        }
        InputAction::None
    }
}
