//! Agent module - the turn loop and context management
//!
//! The agent is responsible for:
//!
//! - Driving the turn-based conversation with the LLM provider
//! - Executing requested tools through the executor (and its permission gate)
//! - Keeping the conversation within a bounded context budget via compaction
//! - Publishing lifecycle events for external observers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │   Session   │<────│  AgentLoop  │────>│ LLMProvider  │
//! └─────────────┘     └─────────────┘     └──────────────┘
//!                        │        │
//!                        ▼        ▼
//!               ┌──────────────┐ ┌────────────────┐
//!               │ ToolExecutor │ │ ContextManager │
//!               │ + Permission │ │  (compaction)  │
//!               └──────────────┘ └────────────────┘
//! ```

mod context;
mod r#loop;
mod states;

pub use context::{CompactionStats, ContextManager};
pub use r#loop::AgentLoop;
pub use states::{LoopContext, LoopState, TerminationReason};
