pub mod event;

pub use event::TurnEvent;

/// Capacity of the per-turn driver → view channel. Small so the driver
/// cannot run far ahead of what the view has rendered.
pub const TURN_CHANNEL_CAPACITY: usize = 16;
