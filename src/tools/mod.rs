pub mod clock;
pub mod filesystem;
pub mod registry;
pub mod web_search;

pub use registry::{parse_arguments, Tool, ToolDefinition, ToolParameters, ToolProperty, ToolRegistry};

use crate::config::Config;
use crate::error::Result;
use filesystem::{ListFilesTool, ReadFileTool, Workspace};
use std::sync::Arc;

/// The tools every surface offers. `web_search` is only registered when a
/// Tavily key is configured.
pub fn builtin_registry(config: &Config) -> Result<ToolRegistry> {
    let workspace = Arc::new(Workspace::new(config.workspace_dir.clone()));
    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool::new(Arc::clone(&workspace)))?;
    registry.register(ListFilesTool::new(workspace))?;
    registry.register(clock::CurrentTimeTool)?;
    if let Some(key) = &config.tavily_api_key {
        registry.register(web_search::WebSearchTool::new(key.clone()))?;
    }
    Ok(registry)
}
