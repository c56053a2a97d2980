//! Tool types for NanoForge
//!
//! Defines the `Tool` trait that all tools implement and the uniform
//! `ToolResult` every execution produces, regardless of whether the failure
//! originated in the tool body, in a permission denial, or in malformed
//! arguments.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ForgeError, Result};

/// Uniform result of a tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// Whether the invocation succeeded
    pub success: bool,
    /// Output content handed back to the model
    pub output: String,
    /// Error message, when the failure carries one
    pub error: Option<String>,
}

impl ToolResult {
    /// Successful result with output.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    /// Failed result with an error message and no output.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message.into()),
        }
    }

    /// Failed result whose output (not error) explains the refusal.
    ///
    /// Used for permission denials: the model should react conversationally,
    /// so the message lands in `output` rather than `error`.
    pub fn denied(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
            error: None,
        }
    }
}

/// Trait that all tools must implement.
///
/// Tools expose a name, description, and JSON-schema parameter map to the
/// LLM, and execute with the arguments the model supplies. Tools never reach
/// for globals: anything they need (limits, collaborators) is injected at
/// construction.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in function calls. Unique within a registry.
    fn name(&self) -> &str;

    /// Description sent to the LLM.
    fn description(&self) -> &str;

    /// Parameter schema: name -> `{type, description, required}`.
    fn parameters(&self) -> Value;

    /// Execute the tool with the given arguments.
    ///
    /// Returning `Err` is fine -- the executor converts every error into a
    /// failed [`ToolResult`] so the model can recover conversationally.
    async fn execute(&self, args: Value) -> Result<ToolResult>;

    /// Description shown when this call needs user approval.
    ///
    /// `Ok(None)` means no approval is needed (read-only tools). An `Err`
    /// here is non-critical: the executor logs it and proceeds unguarded.
    fn approval_description(&self, _args: &Value) -> Result<Option<String>> {
        Ok(None)
    }

    /// Optional diff shown alongside the approval prompt (write-style tools).
    fn approval_diff(&self, _args: &Value) -> Option<String> {
        None
    }
}

/// Extract a required string argument, producing the dedicated
/// missing-parameter error the executor augments with guidance.
pub fn required_str<'a>(tool: &str, args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ForgeError::MissingParameter {
            tool: tool.to_string(),
            parameter: key.to_string(),
        })
}

/// Extract an optional string argument.
pub fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// Truncate output to a byte budget on a char boundary, annotating the cut.
pub fn truncate_output(mut output: String, max_len: usize) -> String {
    if output.len() <= max_len {
        return output;
    }
    let original_len = output.len();
    output.truncate(max_len);
    while !output.is_char_boundary(output.len()) {
        output.pop();
    }
    output.push_str(&format!(
        "\n... [output truncated, {} of {} bytes shown]",
        output.len(),
        original_len
    ));
    output
}
