use crate::error::GhostError;

/// Driver → view messages for one turn.
///
/// Within a turn `Chunk`s arrive in production order and exactly one of
/// `Done` or `Error` is the last event before the channel closes.
#[derive(Debug)]
pub enum TurnEvent {
    /// Filtered display text.
    Chunk(String),
    /// Tool-loop and vision progress, rendered as dimmed activity lines.
    Activity(String),
    Done,
    Error(GhostError),
}

impl TurnEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::Done | TurnEvent::Error(_))
    }
}
