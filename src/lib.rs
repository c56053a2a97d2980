//! NanoForge - Ultra-lightweight terminal coding agent

pub mod agent;
pub mod bus;
pub mod config;
pub mod error;
pub mod permissions;
pub mod provider;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::{AgentLoop, ContextManager, LoopContext, LoopState, TerminationReason};
pub use bus::{AgentEvent, Event, EventBus, EventKind, EventLogger};
pub use config::Config;
pub use error::{ForgeError, ProviderError, Result};
pub use permissions::{ApprovalPrompt, PermissionEngine, PermissionRule, Verdict};
pub use provider::{ClaudeProvider, LLMProvider, ProviderResponse, TokenUsage, ToolSchema};
pub use session::{Message, MessagePart, Role, Session};
pub use tools::{Tool, ToolExecutor, ToolRegistry, ToolResult};
