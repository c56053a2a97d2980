//! Shell tool for NanoForge
//!
//! Executes shell commands via `sh -c` with a timeout and output truncation.
//! Commands touching dangerous patterns request approval; the permission
//! rules then auto-allow, auto-deny, or prompt.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::process::Command;

use crate::error::Result;

use super::{optional_str, required_str, truncate_output, Tool, ToolResult};

/// Default command timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Substrings that mark a command as needing approval.
const DANGEROUS_PATTERNS: &[&str] = &["rm ", "mv ", "dd ", "format", ">", ">>", "|"];

/// Tool for executing shell commands.
pub struct BashTool {
    max_output: usize,
}

impl BashTool {
    pub fn new(max_output: usize) -> Self {
        Self { max_output }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command. Use for running scripts, git commands, package managers, etc."
    }

    fn parameters(&self) -> Value {
        json!({
            "command": {
                "type": "string",
                "description": "The shell command to execute",
                "required": true
            },
            "timeout": {
                "type": "integer",
                "description": "Timeout in seconds (default: 120)"
            },
            "cwd": {
                "type": "string",
                "description": "Working directory for the command"
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let command = required_str(self.name(), &args, "command")?;
        let timeout_secs = args
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(cwd) = optional_str(&args, "cwd") {
            cmd.current_dir(cwd);
        }

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
            .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Ok(ToolResult::error(format!("Error executing command: {}", e)));
            }
            Err(_) => {
                return Ok(ToolResult::error(format!(
                    "Command timed out after {} seconds",
                    timeout_secs
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut parts = Vec::new();
        if !stdout.is_empty() {
            parts.push(stdout.to_string());
        }
        if !stderr.is_empty() {
            parts.push(format!("[stderr]\n{}", stderr));
        }
        let combined = if parts.is_empty() {
            "(no output)".to_string()
        } else {
            parts.join("\n")
        };
        let combined = truncate_output(combined, self.max_output);

        if output.status.success() {
            Ok(ToolResult::ok(combined))
        } else {
            Ok(ToolResult {
                success: false,
                output: combined,
                error: Some(format!(
                    "Command exited with code {}",
                    output.status.code().unwrap_or(-1)
                )),
            })
        }
    }

    /// Only dangerous-looking commands request approval; everything else
    /// runs without consulting the permission gate.
    fn approval_description(&self, args: &Value) -> Result<Option<String>> {
        let command = required_str(self.name(), args, "command")?;
        let dangerous = DANGEROUS_PATTERNS.iter().any(|p| command.contains(p));
        Ok(dangerous.then(|| format!("Run command: {}", command)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bash_captures_stdout() {
        let tool = BashTool::new(10_000);
        let result = tool
            .execute(json!({"command": "echo hello"}))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output.trim(), "hello");
    }

    #[tokio::test]
    async fn test_bash_nonzero_exit() {
        let tool = BashTool::new(10_000);
        let result = tool.execute(json!({"command": "exit 3"})).await.unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("code 3"));
    }

    #[tokio::test]
    async fn test_bash_captures_stderr() {
        let tool = BashTool::new(10_000);
        let result = tool
            .execute(json!({"command": "echo oops 1>&2"}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("[stderr]"));
        assert!(result.output.contains("oops"));
    }

    #[tokio::test]
    async fn test_bash_no_output() {
        let tool = BashTool::new(10_000);
        let result = tool.execute(json!({"command": "true"})).await.unwrap();

        assert!(result.success);
        assert_eq!(result.output, "(no output)");
    }

    #[tokio::test]
    async fn test_bash_timeout() {
        let tool = BashTool::new(10_000);
        let result = tool
            .execute(json!({"command": "sleep 5", "timeout": 1}))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_bash_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool::new(10_000);
        let result = tool
            .execute(json!({"command": "pwd", "cwd": dir.path().to_str().unwrap()}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.trim().ends_with(
            dir.path()
                .file_name()
                .unwrap()
                .to_str()
                .unwrap()
        ));
    }

    #[test]
    fn test_approval_only_for_dangerous_commands() {
        let tool = BashTool::new(10_000);
        assert!(tool
            .approval_description(&json!({"command": "ls -la"}))
            .unwrap()
            .is_none());
        assert!(tool
            .approval_description(&json!({"command": "rm -rf /tmp/x"}))
            .unwrap()
            .is_some());
        assert!(tool
            .approval_description(&json!({"command": "echo hi > out.txt"}))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_approval_missing_command_errors() {
        let tool = BashTool::new(10_000);
        assert!(tool.approval_description(&json!({})).is_err());
    }
}
