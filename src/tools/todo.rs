//! Todo tools - task planning and tracking for the agent.
//!
//! The [`TodoManager`] is instance-based state injected into whoever needs
//! it (the tool, the CLI status line) as a constructor argument -- never
//! looked up from a global.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;

use super::{Tool, ToolResult};

/// Status of a single todo item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

/// A single todo item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    /// Task content (e.g. "Run the build")
    pub content: String,
    pub status: TodoStatus,
}

/// Counts for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TodoSummary {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

/// Instance-based todo state, shared between the tool and the CLI.
#[derive(Default)]
pub struct TodoManager {
    todos: Mutex<Vec<TodoItem>>,
}

impl TodoManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the current todo list.
    pub fn todos(&self) -> Vec<TodoItem> {
        self.todos.lock().expect("todo lock").clone()
    }

    /// Replace the entire todo list.
    pub fn set_todos(&self, todos: Vec<TodoItem>) {
        *self.todos.lock().expect("todo lock") = todos;
    }

    /// Clear the todo list.
    pub fn clear(&self) {
        self.todos.lock().expect("todo lock").clear();
    }

    /// Counts for a status line.
    pub fn summary(&self) -> TodoSummary {
        let todos = self.todos.lock().expect("todo lock");
        let completed = todos
            .iter()
            .filter(|t| t.status == TodoStatus::Completed)
            .count();
        let in_progress = todos
            .iter()
            .filter(|t| t.status == TodoStatus::InProgress)
            .count();
        TodoSummary {
            total: todos.len(),
            pending: todos.len() - completed - in_progress,
            in_progress,
            completed,
        }
    }

    /// The current in-progress task, if any.
    pub fn current_task(&self) -> Option<String> {
        self.todos
            .lock()
            .expect("todo lock")
            .iter()
            .find(|t| t.status == TodoStatus::InProgress)
            .map(|t| t.content.clone())
    }
}

/// Todo list update tool -- replaces the entire list.
pub struct TodoWriteTool {
    manager: Arc<TodoManager>,
}

impl TodoWriteTool {
    pub fn new(manager: Arc<TodoManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Update the todo list. Replaces the entire list. \
         Use for complex multi-step tasks (3+ steps) to plan work and track \
         progress; keep at most ONE item in_progress at a time. Skip it for \
         single simple tasks and pure conversation. \
         Status values: pending, in_progress, completed."
    }

    fn parameters(&self) -> Value {
        json!({
            "todos": {
                "type": "array",
                "description": "The updated todo list (replaces the entire list)",
                "required": true,
                "items": {
                    "type": "object",
                    "properties": {
                        "content": {"type": "string", "description": "Task content"},
                        "status": {
                            "type": "string",
                            "enum": ["pending", "in_progress", "completed"]
                        }
                    },
                    "required": ["content", "status"]
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let Some(raw) = args.get("todos") else {
            return Err(crate::error::ForgeError::MissingParameter {
                tool: self.name().to_string(),
                parameter: "todos".to_string(),
            });
        };

        let todos: Vec<TodoItem> = match serde_json::from_value(raw.clone()) {
            Ok(todos) => todos,
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "Invalid todos list: {}. Each item needs 'content' and a \
                     'status' of pending, in_progress, or completed.",
                    e
                )));
            }
        };

        self.manager.set_todos(todos);

        let todos = self.manager.todos();
        let mut lines = Vec::with_capacity(todos.len() + 1);
        for todo in &todos {
            let marker = match todo.status {
                TodoStatus::Completed => "[x]",
                TodoStatus::InProgress => "[~]",
                TodoStatus::Pending => "[ ]",
            };
            lines.push(format!("{} {}", marker, todo.content));
        }
        let summary = self.manager.summary();
        lines.push(format!(
            "({} total: {} completed, {} in progress, {} pending)",
            summary.total, summary.completed, summary.in_progress, summary.pending
        ));

        Ok(ToolResult::ok(lines.join("\n")))
    }
}
