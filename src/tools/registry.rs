//! Tool registry for NanoForge
//!
//! An explicit registry object built at startup via constructor calls -- no
//! decorator magic, no import-order-dependent global state. The executor
//! looks tools up here; the provider layer asks it for schemas.

use std::collections::HashMap;

use tracing::info;

use crate::provider::ToolSchema;

use super::Tool;

/// A registry that holds and manages tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        info!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Check if a tool exists in the registry.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Names of all registered tools.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Provider-format schemas for all registered tools.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| ToolSchema::for_tool(t.as_ref())).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::tools::ToolResult;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the provided message"
        }
        fn parameters(&self) -> Value {
            json!({
                "message": {
                    "type": "string",
                    "description": "The message to echo",
                    "required": true
                }
            })
        }
        async fn execute(&self, args: Value) -> Result<ToolResult> {
            let message = args
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("(no message)");
            Ok(ToolResult::ok(message))
        }
    }

    #[test]
    fn test_registry_new_is_empty() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.get("echo").is_none());
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        assert!(registry.has("echo"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("echo").unwrap().name(), "echo");
        assert!(registry.names().contains(&"echo"));
    }

    #[test]
    fn test_registry_replace_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(EchoTool));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_schemas() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].name, "echo");
        assert_eq!(schemas[0].input_schema["type"], "object");
        assert_eq!(
            schemas[0].input_schema["required"],
            json!(["message"])
        );
        // The per-property "required" marker must not leak into properties
        assert!(schemas[0].input_schema["properties"]["message"]
            .get("required")
            .is_none());
    }
}
