//! Filesystem tools for NanoForge
//!
//! Thin wrappers with no interesting internal logic: `read`, `write`, and
//! `edit`. Write and edit request approval through the permission gate;
//! write also produces a diff for the approval prompt.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;

use crate::error::Result;

use super::{optional_str, required_str, truncate_output, Tool, ToolResult};

/// Cap on diff lines shown per side in approval prompts.
const MAX_DIFF_LINES: usize = 100;

/// Tool for reading file contents.
pub struct ReadTool {
    max_output: usize,
}

impl ReadTool {
    pub fn new(max_output: usize) -> Self {
        Self { max_output }
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the specified path"
    }

    fn parameters(&self) -> Value {
        json!({
            "file_path": {
                "type": "string",
                "description": "The absolute path to the file to read",
                "required": true
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let file_path = required_str(self.name(), &args, "file_path")?;

        match tokio::fs::read_to_string(file_path).await {
            Ok(content) => Ok(ToolResult::ok(truncate_output(content, self.max_output))),
            Err(e) => Ok(ToolResult::error(format!(
                "Failed to read file '{}': {}",
                file_path, e
            ))),
        }
    }
}

/// Tool for writing content to a file.
///
/// Creates parent directories as needed. Requests approval, with a diff
/// against the current file content when one exists.
pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file if it doesn't exist, overwrites if it does."
    }

    fn parameters(&self) -> Value {
        json!({
            "file_path": {
                "type": "string",
                "description": "The absolute path to the file to write",
                "required": true
            },
            "content": {
                "type": "string",
                "description": "The content to write to the file",
                "required": true
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let file_path = required_str(self.name(), &args, "file_path")?;
        let content = required_str(self.name(), &args, "content")?;

        let path = Path::new(file_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return Ok(ToolResult::error(format!(
                        "Failed to create directory '{}': {}",
                        parent.display(),
                        e
                    )));
                }
            }
        }

        match tokio::fs::write(path, content).await {
            Ok(()) => Ok(ToolResult::ok(format!(
                "Successfully wrote {} bytes to {}",
                content.len(),
                file_path
            ))),
            Err(e) => Ok(ToolResult::error(format!("Error writing file: {}", e))),
        }
    }

    fn approval_description(&self, args: &Value) -> Result<Option<String>> {
        let file_path = required_str(self.name(), args, "file_path")?;
        let content = required_str(self.name(), args, "content")?;
        Ok(Some(format!(
            "Write {} bytes to {}",
            content.len(),
            file_path
        )))
    }

    fn approval_diff(&self, args: &Value) -> Option<String> {
        let file_path = optional_str(args, "file_path")?;
        let new_content = optional_str(args, "content")?;
        let old_content = std::fs::read_to_string(file_path).unwrap_or_default();
        simple_diff(file_path, &old_content, new_content)
    }
}

/// Tool for editing files by exact string replacement.
pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing an exact string with new content. \
         The old_string must match exactly (including whitespace)."
    }

    fn parameters(&self) -> Value {
        json!({
            "file_path": {
                "type": "string",
                "description": "The absolute path to the file to edit",
                "required": true
            },
            "old_string": {
                "type": "string",
                "description": "The exact string to replace",
                "required": true
            },
            "new_string": {
                "type": "string",
                "description": "The string to replace it with",
                "required": true
            },
            "replace_all": {
                "type": "boolean",
                "description": "Replace all occurrences (default: false)"
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let file_path = required_str(self.name(), &args, "file_path")?;
        let old_string = required_str(self.name(), &args, "old_string")?;
        let new_string = required_str(self.name(), &args, "new_string")?;
        let replace_all = args
            .get("replace_all")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let content = match tokio::fs::read_to_string(file_path).await {
            Ok(c) => c,
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "Failed to read file '{}': {}",
                    file_path, e
                )))
            }
        };

        if !content.contains(old_string) {
            let preview: String = old_string.chars().take(50).collect();
            return Ok(ToolResult::error(format!(
                "String not found in file: {}...",
                preview
            )));
        }

        let count = content.matches(old_string).count();
        if count > 1 && !replace_all {
            return Ok(ToolResult::error(format!(
                "Found {} occurrences of the string. \
                 Use replace_all=true to replace all, or provide more context.",
                count
            )));
        }

        let (new_content, replaced) = if replace_all {
            (content.replace(old_string, new_string), count)
        } else {
            (content.replacen(old_string, new_string, 1), 1)
        };

        match tokio::fs::write(file_path, new_content).await {
            Ok(()) => Ok(ToolResult::ok(format!(
                "Replaced {} occurrence(s) in {}",
                replaced, file_path
            ))),
            Err(e) => Ok(ToolResult::error(format!("Error editing file: {}", e))),
        }
    }

    fn approval_description(&self, args: &Value) -> Result<Option<String>> {
        let file_path = required_str(self.name(), args, "file_path")?;
        let old_string = required_str(self.name(), args, "old_string")?;
        let new_string = required_str(self.name(), args, "new_string")?;
        Ok(Some(format!(
            "Edit {}: replace {} chars with {} chars",
            file_path,
            old_string.len(),
            new_string.len()
        )))
    }

    fn approval_diff(&self, args: &Value) -> Option<String> {
        let file_path = optional_str(args, "file_path")?;
        let old_string = optional_str(args, "old_string")?;
        let new_string = optional_str(args, "new_string")?;
        let old_content = std::fs::read_to_string(file_path).ok()?;
        if !old_content.contains(old_string) {
            return None;
        }
        let new_content = old_content.replacen(old_string, new_string, 1);
        simple_diff(file_path, &old_content, &new_content)
    }
}

/// Minimal line diff for approval prompts: trims the common prefix and
/// suffix, shows removed lines as `-` and added lines as `+`.
///
/// Returns `None` when old and new content are identical.
fn simple_diff(path: &str, old: &str, new: &str) -> Option<String> {
    if old == new {
        return None;
    }

    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let common_prefix = old_lines
        .iter()
        .zip(new_lines.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = old_lines.len().min(new_lines.len()) - common_prefix;
    let common_suffix = old_lines
        .iter()
        .rev()
        .zip(new_lines.iter().rev())
        .take_while(|(a, b)| a == b)
        .take(max_suffix)
        .count();

    let mut lines = vec![format!("--- {}", path), format!("+++ {}", path)];
    let removed = &old_lines[common_prefix..old_lines.len() - common_suffix];
    let added = &new_lines[common_prefix..new_lines.len() - common_suffix];

    for line in removed.iter().take(MAX_DIFF_LINES) {
        lines.push(format!("-{}", line));
    }
    if removed.len() > MAX_DIFF_LINES {
        lines.push(format!("... ({} more removed lines)", removed.len() - MAX_DIFF_LINES));
    }
    for line in added.iter().take(MAX_DIFF_LINES) {
        lines.push(format!("+{}", line));
    }
    if added.len() > MAX_DIFF_LINES {
        lines.push(format!("... ({} more added lines)", added.len() - MAX_DIFF_LINES));
    }

    Some(lines.join("\n"))
}
