//! Streaming removal of `<think>...</think>` regions from model output.
//!
//! Tags may be split across any number of tokens, so text that could still
//! turn out to be the start of a tag is held back until the next token (or
//! [`ThinkFilter::flush`]) settles it. The unfiltered stream is kept in
//! [`ThinkFilter::full_text`] for storage and debugging.

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterState {
    /// Nothing visible has been emitted yet; leading whitespace is dropped.
    #[default]
    Deciding,
    InsideThink,
    PassThrough,
}

#[derive(Debug, Default)]
pub struct ThinkFilter {
    state: FilterState,
    pending: String,
    full_text: String,
    visible_started: bool,
}

impl ThinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    /// Everything pushed since the last reset, think blocks included.
    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// Feed one token. Returns the display text it released, if any.
    pub fn push(&mut self, token: &str) -> Option<String> {
        self.full_text.push_str(token);
        if token.is_empty() {
            return None;
        }
        self.pending.push_str(token);

        let mut out = String::new();
        loop {
            if self.state == FilterState::InsideThink {
                if let Some(idx) = self.pending.find(CLOSE_TAG) {
                    self.pending.drain(..idx + CLOSE_TAG.len());
                    self.state = if self.visible_started {
                        FilterState::PassThrough
                    } else {
                        FilterState::Deciding
                    };
                    continue;
                }
                // Only a possible partial close tag is worth keeping.
                let keep = partial_tag_suffix_len(&self.pending, CLOSE_TAG);
                let cut = self.pending.len() - keep;
                self.pending.drain(..cut);
                break;
            }

            if let Some(idx) = self.pending.find(OPEN_TAG) {
                let visible: String = self.pending.drain(..idx).collect();
                self.emit(&visible, &mut out);
                self.pending.drain(..OPEN_TAG.len());
                self.state = FilterState::InsideThink;
                continue;
            }

            let keep = partial_tag_suffix_len(&self.pending, OPEN_TAG);
            let cut = self.pending.len() - keep;
            let visible: String = self.pending.drain(..cut).collect();
            self.emit(&visible, &mut out);
            break;
        }

        (!out.is_empty()).then_some(out)
    }

    /// Settle whatever is still held back at end of stream.
    ///
    /// An unterminated think block is dropped; a dangling partial `<think>`
    /// can no longer become a tag and is released as-is.
    pub fn flush(&mut self) -> Option<String> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() || self.state == FilterState::InsideThink {
            return None;
        }

        let mut out = String::new();
        if OPEN_TAG.starts_with(pending.as_str()) {
            self.visible_started = true;
            self.state = FilterState::PassThrough;
            out.push_str(&pending);
        } else {
            self.emit(&pending, &mut out);
        }
        (!out.is_empty()).then_some(out)
    }

    pub fn reset(&mut self) {
        self.state = FilterState::Deciding;
        self.pending.clear();
        self.full_text.clear();
        self.visible_started = false;
    }

    fn emit(&mut self, text: &str, out: &mut String) {
        let text = if self.visible_started {
            text
        } else {
            text.trim_start_matches(is_ascii_space)
        };
        if text.is_empty() {
            return;
        }
        self.visible_started = true;
        self.state = FilterState::PassThrough;
        out.push_str(text);
    }
}

fn is_ascii_space(ch: char) -> bool {
    matches!(ch, ' ' | '\n' | '\r' | '\t')
}

/// Length of the longest suffix of `text` that is a proper prefix of `tag`.
fn partial_tag_suffix_len(text: &str, tag: &str) -> usize {
    let max = text.len().min(tag.len() - 1);
    (1..=max)
        .rev()
        .find(|&len| {
            let start = text.len() - len;
            text.is_char_boundary(start) && tag.starts_with(&text[start..])
        })
        .unwrap_or(0)
}
