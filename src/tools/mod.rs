//! Tools module - Tool definitions and execution for LLM function calling
//!
//! - `Tool` trait: the interface all tools implement
//! - `ToolResult`: the uniform result every invocation produces
//! - `ToolRegistry`: explicit registry built at startup
//! - `ToolExecutor`: lookup + permission gate + outcome normalization
//!
//! Built-in tools: `read`, `write`, `edit` (filesystem), `glob`, `grep`
//! (search), `bash` (shell), and `todo_write` (task tracking, built around
//! an injected [`TodoManager`]).

pub mod executor;
pub mod filesystem;
mod registry;
pub mod search;
pub mod shell;
pub mod todo;
mod types;

pub use executor::ToolExecutor;
pub use registry::ToolRegistry;
pub use todo::{TodoItem, TodoManager, TodoStatus, TodoWriteTool};
pub use types::{optional_str, required_str, truncate_output, Tool, ToolResult};

use crate::config::Config;

/// Build the standard tool registry from configuration.
///
/// This is the explicit startup construction point -- tools are registered
/// here, not through global mutable state.
pub fn default_registry(config: &Config) -> ToolRegistry {
    let max_output = config.max_output_length();
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(filesystem::ReadTool::new(max_output)));
    registry.register(Box::new(filesystem::WriteTool));
    registry.register(Box::new(filesystem::EditTool));
    registry.register(Box::new(search::GlobTool));
    registry.register(Box::new(search::GrepTool));
    registry.register(Box::new(shell::BashTool::new(max_output)));
    registry
}
