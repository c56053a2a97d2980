//! Provider types for NanoForge
//!
//! Defines the `LLMProvider` trait the agent loop and context manager consume,
//! plus the response and schema types that cross that boundary. The concrete
//! Claude transport lives in [`claude`].

pub mod claude;

pub use claude::ClaudeProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;
use crate::session::MessagePart;
use crate::tools::Tool;

/// Definition of a tool in the provider's schema format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's input object
    pub input_schema: Value,
}

impl ToolSchema {
    /// Build the provider schema for a tool.
    ///
    /// Tools declare parameters as `name -> {type, description, required}`;
    /// the provider wants a JSON-Schema object with a separate `required`
    /// list, so the per-property `required` markers are hoisted out.
    pub fn for_tool(tool: &dyn Tool) -> Self {
        let params = tool.parameters();
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        if let Some(map) = params.as_object() {
            for (key, spec) in map {
                let mut prop = spec.clone();
                if let Some(obj) = prop.as_object_mut() {
                    if obj
                        .remove("required")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false)
                    {
                        required.push(key.clone());
                    }
                }
                properties.insert(key.clone(), prop);
            }
        }

        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

/// Token usage reported by a completion request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Response from an LLM chat request: parsed content blocks, the stop
/// reason, and token usage.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Parsed content blocks (text and tool invocations)
    pub content: Vec<MessagePart>,
    /// Provider stop reason (e.g. "end_turn", "tool_use")
    pub stop_reason: String,
    /// Token usage for the request
    pub usage: TokenUsage,
}

impl ProviderResponse {
    /// A plain text response, useful for stubs and tests.
    pub fn text(content: &str) -> Self {
        Self {
            content: vec![MessagePart::text(content)],
            stop_reason: "end_turn".to_string(),
            usage: TokenUsage::default(),
        }
    }

    /// Whether the response requests any tool invocations.
    pub fn has_tool_uses(&self) -> bool {
        self.content
            .iter()
            .any(|p| matches!(p, MessagePart::ToolUse { .. }))
    }

    /// Join all text blocks with newlines.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Trait for LLM providers.
///
/// The provider translates between the session's wire-format messages and
/// its own API. Rate-limit and generic API failures surface as
/// distinguishable [`crate::error::ProviderError`] variants; the loop never
/// retries them.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a chat request.
    ///
    /// # Arguments
    /// * `messages` - Wire-format conversation history
    /// * `system` - System prompt
    /// * `tools` - Tool schemas the model may invoke
    /// * `max_tokens` - Response token cap
    async fn chat(
        &self,
        messages: Vec<Value>,
        system: &str,
        tools: &[ToolSchema],
        max_tokens: u32,
    ) -> Result<ProviderResponse>;

    /// Provider name (e.g. "claude").
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolResult;

    struct FakeTool;

    #[async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> &str {
            "fake"
        }
        fn description(&self) -> &str {
            "A fake tool"
        }
        fn parameters(&self) -> Value {
            json!({
                "path": {"type": "string", "description": "a path", "required": true},
                "limit": {"type": "integer", "description": "a limit"}
            })
        }
        async fn execute(&self, _args: Value) -> Result<ToolResult> {
            Ok(ToolResult::ok(""))
        }
    }

    #[test]
    fn test_schema_for_tool_hoists_required() {
        let schema = ToolSchema::for_tool(&FakeTool);
        assert_eq!(schema.name, "fake");
        assert_eq!(schema.input_schema["type"], "object");
        assert_eq!(schema.input_schema["required"], json!(["path"]));
        assert!(schema.input_schema["properties"]["path"]
            .get("required")
            .is_none());
        assert_eq!(
            schema.input_schema["properties"]["limit"]["type"],
            "integer"
        );
    }

    #[test]
    fn test_provider_response_text() {
        let resp = ProviderResponse::text("hello");
        assert!(!resp.has_tool_uses());
        assert_eq!(resp.text_content(), "hello");
        assert_eq!(resp.stop_reason, "end_turn");
    }

    #[test]
    fn test_provider_response_tool_uses() {
        let resp = ProviderResponse {
            content: vec![
                MessagePart::text("working"),
                MessagePart::tool_use("id1", "read", json!({})),
            ],
            stop_reason: "tool_use".to_string(),
            usage: TokenUsage::default(),
        };
        assert!(resp.has_tool_uses());
        assert_eq!(resp.text_content(), "working");
    }
}
