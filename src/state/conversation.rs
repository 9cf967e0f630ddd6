mod core;
mod history;
mod state;
mod streaming;
mod tools;

#[cfg(test)]
mod tests;

pub use state::{ConversationManager, TurnInput, TurnOutcome, TurnSettings};
