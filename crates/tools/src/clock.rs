//! Clock tool reporting the current UTC time.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

use colloquy_core::error::ToolError;
use colloquy_core::tool::Tool;

pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time in UTC"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "enum": ["rfc3339", "unix"],
                    "description": "Output format (default: rfc3339)",
                    "default": "rfc3339"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let now = Utc::now();
        let time = match arguments["format"].as_str() {
            None | Some("rfc3339") => {
                serde_json::json!(now.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            Some("unix") => serde_json::json!(now.timestamp()),
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "Unknown format '{other}', expected 'rfc3339' or 'unix'"
                )));
            }
        };

        Ok(serde_json::json!({
            "time": time,
            "timezone": "UTC",
        }))
    }
}
