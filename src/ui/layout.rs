use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Transcript on top, the input box below it, one status row at the bottom.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatLayout {
    pub transcript: Rect,
    pub input: Rect,
    pub status: Rect,
}

pub fn split_chat_layout(area: Rect, input_rows: u16) -> ChatLayout {
    let max_input = area.height.saturating_sub(2).max(1);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(input_rows.clamp(1, max_input)),
            Constraint::Length(1),
        ])
        .split(area);

    ChatLayout {
        transcript: chunks[0],
        input: chunks[1],
        status: chunks[2],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_stacks_transcript_input_status() {
        let panes = split_chat_layout(Rect::new(0, 0, 80, 20), 3);

        assert_eq!(panes.transcript.height, 16);
        assert_eq!(panes.input.height, 3);
        assert_eq!(panes.status.height, 1);
        assert_eq!(panes.input.y, 16);
        assert_eq!(panes.status.y, 19);
    }

    #[test]
    fn tall_input_never_hides_the_transcript() {
        let panes = split_chat_layout(Rect::new(0, 0, 80, 8), 30);

        assert_eq!(panes.input.height, 6);
        assert_eq!(panes.transcript.height, 1);
        assert_eq!(panes.status.height, 1);
    }
}
