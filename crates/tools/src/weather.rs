//! Weather tool returning mock weather data.
//!
//! In production this would call a real weather API. The stub derives
//! plausible, deterministic data from the location name so agent runs
//! are reproducible without network access.

use async_trait::async_trait;

use colloquy_core::error::ToolError;
use colloquy_core::tool::Tool;

pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a location"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city and state, e.g. San Francisco, CA"
                },
                "unit": {
                    "type": "string",
                    "enum": ["celsius", "fahrenheit"],
                    "description": "Temperature unit (default: celsius)",
                    "default": "celsius"
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let location = arguments["location"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'location' argument".into()))?;

        let unit = match arguments["unit"].as_str() {
            None => "celsius",
            Some(u @ ("celsius" | "fahrenheit")) => u,
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "Unknown unit '{other}', expected 'celsius' or 'fahrenheit'"
                )));
            }
        };

        let report = mock_weather(location, unit);
        serde_json::to_value(&report)
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "get_weather".into(),
                reason: e.to_string(),
            })
    }
}

#[derive(serde::Serialize)]
struct WeatherReport {
    location: String,
    temperature: i64,
    unit: String,
    condition: String,
}

/// Derive deterministic mock weather from the location name.
fn mock_weather(location: &str, unit: &str) -> WeatherReport {
    let hash: u32 = location
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));

    let conditions = ["Sunny", "Partly cloudy", "Overcast", "Light rain"];

    let celsius = (hash % 30) as i64;
    let temperature = if unit == "fahrenheit" {
        celsius * 9 / 5 + 32
    } else {
        celsius
    };

    WeatherReport {
        location: location.to_string(),
        temperature,
        unit: unit.to_string(),
        condition: conditions[(hash as usize / 7) % conditions.len()].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_returns_weather() {
        let tool = WeatherTool;
        let result = tool
            .execute(serde_json::json!({"location": "Tokyo"}))
            .await
            .unwrap();

        assert_eq!(result["location"], "Tokyo");
        assert_eq!(result["unit"], "celsius");
        assert!(result["temperature"].is_i64());
        assert!(result["condition"].is_string());
    }

    #[tokio::test]
    async fn deterministic_results() {
        let tool = WeatherTool;
        let r1 = tool
            .execute(serde_json::json!({"location": "London"}))
            .await
            .unwrap();
        let r2 = tool
            .execute(serde_json::json!({"location": "London"}))
            .await
            .unwrap();

        assert_eq!(r1, r2);
    }

    #[tokio::test]
    async fn fahrenheit_conversion() {
        let tool = WeatherTool;
        let celsius = tool
            .execute(serde_json::json!({"location": "Paris"}))
            .await
            .unwrap();
        let fahrenheit = tool
            .execute(serde_json::json!({"location": "Paris", "unit": "fahrenheit"}))
            .await
            .unwrap();

        let c = celsius["temperature"].as_i64().unwrap();
        let f = fahrenheit["temperature"].as_i64().unwrap();
        assert_eq!(f, c * 9 / 5 + 32);
        assert_eq!(fahrenheit["unit"], "fahrenheit");
    }

    #[tokio::test]
    async fn missing_location_is_rejected() {
        let tool = WeatherTool;
        let result = tool.execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn unknown_unit_is_rejected() {
        let tool = WeatherTool;
        let result = tool
            .execute(serde_json::json!({"location": "Oslo", "unit": "kelvin"}))
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[test]
    fn tool_definition() {
        let def = WeatherTool.to_definition();
        assert_eq!(def.name, "get_weather");
        assert_eq!(def.parameters["required"][0], "location");
    }
}
