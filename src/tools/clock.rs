use super::registry::{parse_arguments, Tool, ToolParameters};
use crate::error::{GhostError, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;

pub struct CurrentTimeTool;

impl CurrentTimeTool {
    pub const NAME: &'static str = "current_time";
}

#[derive(Deserialize)]
struct CurrentTimeArgs {
    #[serde(default)]
    timezone: Option<String>,
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Get the current date and time as an RFC 3339 timestamp in UTC."
    }

    fn parameters(&self) -> ToolParameters {
        ToolParameters::new().optional("timezone", "string", "Only \"UTC\" is supported")
    }

    async fn execute(&self, arguments: Value) -> Result<String> {
        let args: CurrentTimeArgs = parse_arguments(Self::NAME, arguments)?;
        match args.timezone.as_deref().map(str::trim) {
            None | Some("") => {}
            Some(tz) if tz.eq_ignore_ascii_case("utc") || tz.eq_ignore_ascii_case("z") => {}
            Some(tz) => {
                return Err(GhostError::tool_execution(
                    Self::NAME,
                    format!("unsupported timezone '{tz}'; only UTC is available"),
                ))
            }
        }
        Ok(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}
