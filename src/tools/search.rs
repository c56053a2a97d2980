//! Search tools for NanoForge
//!
//! `glob` finds files by pattern; `grep` searches file contents with a
//! regex. Both are read-only and auto-allowed by the default permission
//! rules.

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::SystemTime;

use crate::error::Result;

use super::{optional_str, required_str, Tool, ToolResult};

/// Cap on grep matches reported back to the model.
const MAX_MATCHES: usize = 100;

/// Tool for finding files by glob pattern.
pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files by glob pattern ('**/*.rs', 'src/**/*.ts'). \
         Use when asked to find files by name or extension."
    }

    fn parameters(&self) -> Value {
        json!({
            "pattern": {
                "type": "string",
                "description": "The glob pattern to match files against",
                "required": true
            },
            "path": {
                "type": "string",
                "description": "The directory to search in (default: current directory)"
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let pattern = required_str(self.name(), &args, "pattern")?;
        let base = optional_str(&args, "path").unwrap_or(".");

        let base_path = PathBuf::from(base);
        if !base_path.exists() {
            return Ok(ToolResult::error(format!("Directory not found: {}", base)));
        }
        if !base_path.is_dir() {
            return Ok(ToolResult::error(format!("Not a directory: {}", base)));
        }

        let full_pattern = base_path.join(pattern);
        let paths = match glob::glob(&full_pattern.to_string_lossy()) {
            Ok(paths) => paths,
            Err(e) => {
                return Ok(ToolResult::error(format!("Invalid glob pattern: {}", e)));
            }
        };

        let mut files: Vec<(PathBuf, SystemTime)> = paths
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .map(|p| {
                let mtime = p
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (p, mtime)
            })
            .collect();

        if files.is_empty() {
            return Ok(ToolResult::ok("No files found matching pattern."));
        }

        // Newest first
        files.sort_by(|a, b| b.1.cmp(&a.1));
        let listing = files
            .iter()
            .map(|(p, _)| p.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ToolResult::ok(listing))
    }
}

/// Tool for searching file contents with a regex.
pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents with regex, returns matches as file:line:content. \
         Use when asked to find code containing specific text or a pattern."
    }

    fn parameters(&self) -> Value {
        json!({
            "pattern": {
                "type": "string",
                "description": "The regex pattern to search for",
                "required": true
            },
            "path": {
                "type": "string",
                "description": "File or directory to search in"
            },
            "glob": {
                "type": "string",
                "description": "Glob pattern to filter files (e.g. '*.rs')"
            },
            "case_insensitive": {
                "type": "boolean",
                "description": "Case insensitive search (default: false)"
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let pattern = required_str(self.name(), &args, "pattern")?;
        let case_insensitive = args
            .get("case_insensitive")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let regex = match RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
        {
            Ok(r) => r,
            Err(e) => {
                return Ok(ToolResult::error(format!("Invalid regex pattern: {}", e)));
            }
        };

        let base = PathBuf::from(optional_str(&args, "path").unwrap_or("."));
        if !base.exists() {
            return Ok(ToolResult::error(format!(
                "Path not found: {}",
                base.display()
            )));
        }

        let files: Vec<PathBuf> = if base.is_file() {
            vec![base]
        } else {
            let file_glob = optional_str(&args, "glob").unwrap_or("**/*");
            let full_pattern = base.join(file_glob);
            match glob::glob(&full_pattern.to_string_lossy()) {
                Ok(paths) => paths
                    .filter_map(|entry| entry.ok())
                    .filter(|p| p.is_file())
                    .collect(),
                Err(e) => {
                    return Ok(ToolResult::error(format!("Invalid glob pattern: {}", e)));
                }
            }
        };

        let mut matches = Vec::new();
        for file in files {
            // Skip binary files and files we can't read
            let Ok(content) = std::fs::read_to_string(&file) else {
                continue;
            };
            for (line_num, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(format!("{}:{}:{}", file.display(), line_num + 1, line));
                }
            }
        }

        if matches.is_empty() {
            return Ok(ToolResult::ok("No matches found."));
        }

        let output = if matches.len() > MAX_MATCHES {
            format!(
                "{}\n... and {} more matches",
                matches[..MAX_MATCHES].join("\n"),
                matches.len() - MAX_MATCHES
            )
        } else {
            matches.join("\n")
        };

        Ok(ToolResult::ok(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_glob_finds_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "").unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.rs"), "").unwrap();

        let tool = GlobTool;
        let result = tool
            .execute(json!({"pattern": "**/*.rs", "path": dir.path().to_str().unwrap()}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("a.rs"));
        assert!(result.output.contains("c.rs"));
        assert!(!result.output.contains("b.txt"));
    }

    #[tokio::test]
    async fn test_glob_no_matches() {
        let dir = tempdir().unwrap();
        let tool = GlobTool;
        let result = tool
            .execute(json!({"pattern": "*.zig", "path": dir.path().to_str().unwrap()}))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "No files found matching pattern.");
    }

    #[tokio::test]
    async fn test_glob_missing_directory() {
        let tool = GlobTool;
        let result = tool
            .execute(json!({"pattern": "*", "path": "/definitely/not/here"}))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("Directory not found"));
    }

    #[tokio::test]
    async fn test_grep_finds_matches() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn main() {}\nfn helper() {}").unwrap();
        std::fs::write(dir.path().join("b.rs"), "struct Thing;").unwrap();

        let tool = GrepTool;
        let result = tool
            .execute(json!({"pattern": "fn \\w+", "path": dir.path().to_str().unwrap()}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("a.rs:1:fn main() {}"));
        assert!(result.output.contains("a.rs:2:fn helper() {}"));
        assert!(!result.output.contains("b.rs"));
    }

    #[tokio::test]
    async fn test_grep_case_insensitive() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Hello World").unwrap();

        let tool = GrepTool;
        let result = tool
            .execute(json!({
                "pattern": "hello",
                "path": dir.path().to_str().unwrap(),
                "case_insensitive": true
            }))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("Hello World"));
    }

    #[tokio::test]
    async fn test_grep_invalid_regex() {
        let tool = GrepTool;
        let result = tool.execute(json!({"pattern": "[unclosed"})).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Invalid regex"));
    }

    #[tokio::test]
    async fn test_grep_no_matches() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "nothing here").unwrap();

        let tool = GrepTool;
        let result = tool
            .execute(json!({"pattern": "absent", "path": dir.path().to_str().unwrap()}))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output, "No matches found.");
    }

    #[tokio::test]
    async fn test_grep_single_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("only.txt");
        std::fs::write(&path, "needle in line").unwrap();

        let tool = GrepTool;
        let result = tool
            .execute(json!({"pattern": "needle", "path": path.to_str().unwrap()}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("needle in line"));
    }
}
