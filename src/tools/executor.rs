//! Tool executor for NanoForge
//!
//! Looks up the requested tool, routes the call through the permission
//! engine, executes it, and normalizes every outcome -- unknown tool,
//! permission denial, malformed arguments, tool failure -- into a single
//! [`ToolResult`]. The executor never raises for anything the model could
//! recover from conversationally.

use serde_json::Value;
use tracing::{info, warn};

use crate::error::ForgeError;
use crate::permissions::PermissionEngine;

use super::{ToolRegistry, ToolResult};

/// Output handed to the model when the user denies a tool call.
///
/// Deliberately not an error: the model should react conversationally.
const DENIED_MESSAGE: &str =
    "User denied permission for this action. Please ask what they would like to do instead.";

/// Executes tools on behalf of the LLM, with optional permission gating.
pub struct ToolExecutor {
    registry: ToolRegistry,
    permission: Option<PermissionEngine>,
}

impl ToolExecutor {
    /// Create an executor over a registry, with no permission gating.
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            permission: None,
        }
    }

    /// Attach a permission engine.
    pub fn with_permission_engine(mut self, engine: PermissionEngine) -> Self {
        self.permission = Some(engine);
        self
    }

    /// The underlying tool registry.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// The permission engine, if attached (for history inspection).
    pub fn permission_engine(&self) -> Option<&PermissionEngine> {
        self.permission.as_ref()
    }

    /// Execute a tool by name with the given input.
    ///
    /// Always returns a [`ToolResult`]; never an error. Unknown tools,
    /// denials, and tool failures all come back as failed results the model
    /// can see and react to.
    pub async fn execute(&mut self, tool_name: &str, input: Value) -> ToolResult {
        let Self {
            registry,
            permission,
        } = self;

        let Some(tool) = registry.get(tool_name) else {
            return ToolResult::error(format!("Unknown tool: {}", tool_name));
        };

        if let Some(engine) = permission.as_mut() {
            if engine.is_enabled() {
                match tool.approval_description(&input) {
                    Ok(Some(details)) => {
                        let diff = tool.approval_diff(&input);
                        let approved = engine.check(tool_name, &details, &input, diff.as_deref());
                        if !approved {
                            info!(tool = tool_name, "Tool call denied");
                            return ToolResult::denied(DENIED_MESSAGE);
                        }
                    }
                    Ok(None) => {}
                    // A failing approval hook must never block execution
                    Err(e) => {
                        warn!(tool = tool_name, error = %e, "Failed to check permission");
                    }
                }
            }
        }

        let start = std::time::Instant::now();
        match tool.execute(input).await {
            Ok(result) => {
                info!(
                    tool = tool_name,
                    success = result.success,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool executed"
                );
                result
            }
            Err(ForgeError::MissingParameter { tool, parameter }) => {
                warn!(tool = %tool, parameter = %parameter, "Tool called with missing parameter");
                ToolResult::error(format!(
                    "Tool '{}' called with missing required parameter '{}'. \
                     Please make sure to provide all required parameters.{}",
                    tool,
                    parameter,
                    remediation_hint(&tool)
                ))
            }
            Err(e) => {
                warn!(tool = tool_name, error = %e, "Tool execution failed");
                ToolResult::error(format!("Error executing {}: {}", tool_name, e))
            }
        }
    }

    /// Synchronous entry point for callers outside an async context.
    ///
    /// Inside a running tokio runtime this routes through `block_in_place`
    /// on the current handle; outside, it drives a locally owned
    /// current-thread runtime. A second runtime is never nested inside a
    /// running one.
    pub fn execute_blocking(&mut self, tool_name: &str, input: Value) -> ToolResult {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => tokio::task::block_in_place(|| {
                handle.block_on(self.execute(tool_name, input))
            }),
            Err(_) => {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        return ToolResult::error(format!("Failed to start runtime: {}", e))
                    }
                };
                runtime.block_on(self.execute(tool_name, input))
            }
        }
    }
}

/// Tool-specific guidance appended to missing-parameter failures so the
/// model can self-correct its next call.
fn remediation_hint(tool_name: &str) -> String {
    match tool_name {
        "write" => "\n\nFor 'write' you MUST provide both:\n\
             - file_path: the path to the file\n\
             - content: the FULL content to write\n\n\
             Compose the entire file content first, then make ONE write call \
             with both parameters included."
            .to_string(),
        "edit" => "\n\nFor 'edit' you MUST provide:\n\
             - file_path: the path to the file\n\
             - old_string: the exact text to replace\n\
             - new_string: the replacement text"
            .to_string(),
        _ => String::new(),
    }
}
