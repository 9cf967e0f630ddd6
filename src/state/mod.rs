pub mod conversation;
pub mod think_filter;

pub use conversation::{ConversationManager, TurnInput, TurnOutcome, TurnSettings};
pub use think_filter::{FilterState, ThinkFilter};
