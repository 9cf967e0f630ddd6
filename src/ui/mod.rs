pub mod editor;
pub mod input_metrics;
pub mod layout;
pub mod render;
pub mod view;

pub use editor::{InputAction, InputEditor};
pub use view::{ChatView, LineKind, Mode, TranscriptEntry, ViewCommand};
