pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod state;
pub mod store;
pub mod terminal;
pub mod tools;
pub mod types;
pub mod ui;
pub mod util;
pub mod vision;

#[doc(hidden)]
pub mod test_support;

pub use error::{GhostError, Result};
