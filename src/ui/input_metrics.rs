use unicode_width::UnicodeWidthChar;

/// Hard-wrap `input` at `width` display columns. Always returns at least
/// one (possibly empty) line.
pub fn wrap_input_lines(input: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = vec![String::new()];
    let mut used = 0usize;
    for ch in input.chars() {
        match ch {
            '\r' => continue,
            '\n' => {
                lines.push(String::new());
                used = 0;
                continue;
            }
            _ => {}
        }
        let ch_width = char_display_width(ch);
        if used + ch_width > width && used > 0 {
            lines.push(String::new());
            used = 0;
        }
        if let Some(line) = lines.last_mut() {
            line.push(ch);
        }
        used += ch_width;
    }
    lines
}

/// Rows a block of text occupies when wrapped at `width`.
pub fn wrapped_height(text: &str, width: usize) -> usize {
    wrap_input_lines(text, width).len()
}

pub fn cursor_row_col(input: &str, cursor_byte: usize, width: usize) -> (usize, usize) {
    let width = width.max(1);
    let cursor_byte = clamp_to_char_boundary_left(input, cursor_byte);
    let mut row = 0usize;
    let mut col = 0usize;

    for ch in input[..cursor_byte].chars() {
        match ch {
            '\r' => continue,
            '\n' => {
                row += 1;
                col = 0;
                continue;
            }
            _ => {}
        }
        let ch_width = char_display_width(ch);
        if col + ch_width > width && col > 0 {
            row += 1;
            col = 0;
        }
        col += ch_width;
    }

    if col >= width {
        row += 1;
        col = 0;
    }
    (row, col)
}

/// Cut `text` to `max_width` columns, ending in `...` when shortened.
pub fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    let max_width = max_width.max(1);
    if display_width(text) <= max_width {
        return text.to_string();
    }
    let budget = max_width.saturating_sub(3);
    let mut out = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let ch_width = char_display_width(ch);
        if used + ch_width > budget {
            break;
        }
        out.push(ch);
        used += ch_width;
    }
    if max_width >= 4 {
        out.push_str("...");
    }
    out
}

pub fn char_display_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(0)
}

pub fn display_width(text: &str) -> usize {
    text.chars().map(char_display_width).sum()
}

pub fn clamp_to_char_boundary_left(input: &str, cursor: usize) -> usize {
    let mut cursor = cursor.min(input.len());
    while cursor > 0 && !input.is_char_boundary(cursor) {
        cursor -= 1;
    }
    cursor
}
