use super::input_metrics::{cursor_row_col, truncate_with_ellipsis, wrap_input_lines};
use super::layout::split_chat_layout;
use super::view::{ChatView, LineKind, Mode};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

const INPUT_PROMPT: &str = "> ";
const MAX_INPUT_ROWS: usize = 8;

pub fn input_visual_rows(input: &str, width: usize) -> usize {
    wrap_input_lines(input, width.saturating_sub(INPUT_PROMPT.len()))
        .len()
        .clamp(1, MAX_INPUT_ROWS)
}

fn line_style(kind: LineKind) -> Style {
    match kind {
        LineKind::User => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        LineKind::Assistant => Style::default().fg(Color::White),
        LineKind::Activity => Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM),
        LineKind::Error => Style::default().fg(Color::Red),
        LineKind::Info => Style::default().fg(Color::Yellow),
        LineKind::Blank => Style::default(),
    }
}

/// Draw the whole chat screen. Updates the view's viewport first so scroll
/// clamping matches what is on screen.
pub fn draw(frame: &mut Frame<'_>, view: &mut ChatView) {
    let area = frame.area();
    let input_rows = input_visual_rows(view.editor().buffer(), area.width as usize) as u16;
    let panes = split_chat_layout(area, input_rows);

    view.set_viewport(
        panes.transcript.width as usize,
        panes.transcript.height as usize,
    );
    render_transcript(frame, panes.transcript, view);
    render_input(frame, panes.input, view);
    render_status_line(frame, panes.status, &view.status_text());
}

pub fn render_transcript(frame: &mut Frame<'_>, area: Rect, view: &ChatView) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    let lines: Vec<Line<'_>> = view
        .visible_lines()
        .into_iter()
        .take(area.height as usize)
        .map(|(kind, text)| Line::from(Span::styled(text, line_style(kind))))
        .collect();
    frame.render_widget(Paragraph::new(lines), area);
}

pub fn render_input(frame: &mut Frame<'_>, area: Rect, view: &ChatView) {
    if area.height == 0 || area.width <= 2 {
        return;
    }
    let input = view.editor().buffer();
    let input_width = (area.width as usize).saturating_sub(INPUT_PROMPT.len()).max(1);
    let lines = wrap_input_lines(input, input_width);
    let (cursor_row, cursor_col) = cursor_row_col(input, view.editor().cursor(), input_width);
    let visible_rows = area.height as usize;
    let window_start = cursor_row.saturating_add(1).saturating_sub(visible_rows);

    let rendered: Vec<Line<'_>> = (0..visible_rows)
        .map(|offset| {
            let row_index = window_start + offset;
            let prefix = if row_index == 0 { INPUT_PROMPT } else { "  " };
            let line = lines.get(row_index).cloned().unwrap_or_default();
            Line::from(format!("{prefix}{line}"))
        })
        .collect();

    let mut style = Style::default().bg(Color::Rgb(24, 24, 24));
    if view.mode() != Mode::Insert {
        style = style.fg(Color::Gray).add_modifier(Modifier::DIM);
    }
    frame.render_widget(Paragraph::new(rendered).style(style), area);

    if view.mode() == Mode::Insert {
        let cursor_y = area
            .y
            .saturating_add(cursor_row.saturating_sub(window_start) as u16);
        let cursor_x = area
            .x
            .saturating_add((INPUT_PROMPT.len() + cursor_col) as u16)
            .min(area.x.saturating_add(area.width.saturating_sub(1)));
        frame.set_cursor_position((cursor_x, cursor_y));
    }
}

pub fn render_status_line(frame: &mut Frame<'_>, area: Rect, status: &str) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    let text = truncate_with_ellipsis(status, area.width as usize);
    frame.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}
