//! Built-in tool implementations for Colloquy.
//!
//! Tools give the agent structured actions it can take mid-run. The
//! built-ins are deliberately side-effect free so the loop can be
//! exercised end-to-end without network access or credentials.

pub mod clock;
pub mod weather;

use colloquy_core::tool::ToolRegistry;

/// Create a registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(weather::WeatherTool));
    registry.register(Box::new(clock::ClockTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_builtins() {
        let registry = default_registry();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("get_weather").is_some());
        assert!(registry.get("current_time").is_some());
    }
}
