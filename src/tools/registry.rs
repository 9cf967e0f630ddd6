use crate::error::{GhostError, Result};
use crate::types::{ToolFunctionSpec, ToolSpec};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// A callable tool. Arguments arrive as opaque JSON; each tool parses them
/// into its own type with [`parse_arguments`].
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> ToolParameters;

    async fn execute(&self, arguments: Value) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolProperty {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: String,
}

/// JSON-schema object describing a tool's arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolParameters {
    #[serde(rename = "type")]
    pub schema_type: &'static str,
    pub properties: BTreeMap<String, ToolProperty>,
    pub required: Vec<String>,
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolParameters {
    pub fn new() -> Self {
        Self {
            schema_type: "object",
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn required(self, name: &str, kind: &'static str, description: &str) -> Self {
        let mut params = self.optional(name, kind, description);
        params.required.push(name.to_string());
        params
    }

    pub fn optional(mut self, name: &str, kind: &'static str, description: &str) -> Self {
        self.properties.insert(
            name.to_string(),
            ToolProperty {
                kind,
                description: description.to_string(),
            },
        );
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
}

impl ToolDefinition {
    pub fn to_spec(&self) -> ToolSpec {
        ToolSpec {
            kind: "function".to_string(),
            function: ToolFunctionSpec {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: serde_json::to_value(&self.parameters)
                    .unwrap_or_else(|_| Value::Object(serde_json::Map::new())),
            },
        }
    }
}

/// Decode `arguments` into `T`, mapping failures to `ToolArgumentParse`.
///
/// Models sometimes send the arguments object as a JSON string; that form
/// is accepted too.
pub fn parse_arguments<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T> {
    let arguments = match arguments {
        Value::String(raw) => serde_json::from_str(&raw).map_err(|e| argument_error(tool, e))?,
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| argument_error(tool, e))
}

fn argument_error(tool: &str, error: serde_json::Error) -> GhostError {
    GhostError::ToolArgumentParse {
        tool: tool.to_string(),
        reason: error.to_string(),
    }
}

/// Name-indexed tools. Populated at startup, read-only afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(GhostError::InvalidConfig(format!(
                "tool '{name}' is registered twice"
            )));
        }
        debug!(tool = %name, "registered tool");
        self.order.push(name.clone());
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.definitions().iter().map(ToolDefinition::to_spec).collect()
    }

    /// Run one tool call exactly once.
    #[instrument(skip(self, arguments, cancel), fields(tool = %name))]
    pub async fn execute(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let tool = self
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| GhostError::ToolNotRegistered(name.to_string()))?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GhostError::Cancelled),
            result = tool.execute(arguments) => result,
        };
        match &result {
            Ok(output) => info!(output_len = output.len(), "tool finished"),
            Err(error) => warn!(%error, "tool failed"),
        }
        result
    }
}
