//! Tool trait and registry.
//!
//! Tools are the agent's callable capabilities. Each one is registered
//! by name at startup; the agent loop resolves calls against the
//! registry when the model requests them.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::ToolError;
use crate::model::ToolDefinition;

/// The capability every tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique registry key (e.g. "get_weather").
    fn name(&self) -> &str;

    /// What this tool does, sent to the model backend for grounding.
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's input shape.
    fn schema(&self) -> serde_json::Value;

    /// Execute the tool with already-parsed arguments.
    ///
    /// Implementations own validation of the input shape; a mismatch is
    /// reported as [`ToolError::InvalidArguments`].
    async fn execute(&self, arguments: serde_json::Value)
    -> Result<serde_json::Value, ToolError>;

    /// The wire-facing definition of this tool.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.schema(),
        }
    }
}

/// A registry of available tools, keyed by name.
///
/// Registration happens at startup (or test setup); agent runs share
/// the registry read-only behind an `Arc`. Registering a name twice
/// replaces the earlier tool.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Look up a tool by name. `None` is the not-found signal; lookups
    /// never fail.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Definitions of every registered tool, for the model request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Names of every registered tool.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
