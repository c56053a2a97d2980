//! Event bus for NanoForge
//!
//! A small synchronous pub/sub bus that publishes lifecycle notifications
//! (turn started, tool executed, state changed, ...) to external observers
//! without the loop depending on them. Handlers run synchronously in
//! subscription order: typed handlers first, then global handlers. A
//! panicking handler is caught and logged -- it never blocks other handlers
//! or the loop.
//!
//! The subscriber list is mutated only through `subscribe`/`unsubscribe`,
//! never during a publish: `publish` snapshots the handler list before
//! invoking anything.

pub mod logger;

pub use logger::EventLogger;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::warn;

/// Lifecycle notification payloads.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// The agent loop started a run.
    LoopStarted {
        session_id: String,
        user_message: String,
    },
    /// The agent loop finished a run.
    LoopCompleted {
        termination_reason: String,
        total_turns: usize,
        duration_ms: f64,
    },
    /// A new turn started.
    TurnStarted { turn: usize, max_turns: usize },
    /// A turn completed.
    TurnCompleted { turn: usize, tool_calls: usize },
    /// The loop state changed.
    StateChanged {
        old_state: String,
        new_state: String,
    },
    /// An LLM request is about to be sent.
    LlmRequest {
        message_count: usize,
        has_tools: bool,
    },
    /// An LLM response was received.
    LlmResponse {
        stop_reason: String,
        input_tokens: u32,
        output_tokens: u32,
        duration_ms: f64,
    },
    /// A tool is about to execute.
    ToolExecutionStarted { tool_name: String },
    /// A tool execution finished.
    ToolExecutionCompleted {
        tool_name: String,
        success: bool,
        duration_ms: f64,
    },
    /// A message was appended to the session.
    MessageAdded { role: String, part_count: usize },
    /// Context compaction was performed.
    ContextCompaction {
        tokens_before: usize,
        tokens_after: usize,
        messages_removed: usize,
    },
}

impl AgentEvent {
    /// The kind discriminator used for typed subscriptions.
    pub fn kind(&self) -> EventKind {
        match self {
            AgentEvent::LoopStarted { .. } => EventKind::LoopStarted,
            AgentEvent::LoopCompleted { .. } => EventKind::LoopCompleted,
            AgentEvent::TurnStarted { .. } => EventKind::TurnStarted,
            AgentEvent::TurnCompleted { .. } => EventKind::TurnCompleted,
            AgentEvent::StateChanged { .. } => EventKind::StateChanged,
            AgentEvent::LlmRequest { .. } => EventKind::LlmRequest,
            AgentEvent::LlmResponse { .. } => EventKind::LlmResponse,
            AgentEvent::ToolExecutionStarted { .. } => EventKind::ToolExecutionStarted,
            AgentEvent::ToolExecutionCompleted { .. } => EventKind::ToolExecutionCompleted,
            AgentEvent::MessageAdded { .. } => EventKind::MessageAdded,
            AgentEvent::ContextCompaction { .. } => EventKind::ContextCompaction,
        }
    }
}

/// Event kind discriminator for typed subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    LoopStarted,
    LoopCompleted,
    TurnStarted,
    TurnCompleted,
    StateChanged,
    LlmRequest,
    LlmResponse,
    ToolExecutionStarted,
    ToolExecutionCompleted,
    MessageAdded,
    ContextCompaction,
}

/// A published event: payload plus timestamp.
#[derive(Debug, Clone)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub payload: AgentEvent,
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct BusInner {
    next_id: u64,
    typed: Vec<(u64, EventKind, Handler)>,
    global: Vec<(u64, Handler)>,
}

/// Handle returned by a subscription; pass to [`EventBus::unsubscribe`].
#[derive(Debug)]
pub struct Subscription(u64);

/// Simple synchronous event bus.
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    /// Create a new event bus with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner {
                next_id: 0,
                typed: Vec::new(),
                global: Vec::new(),
            }),
        }
    }

    /// Subscribe to a specific event kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().expect("bus lock");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.typed.push((id, kind, Arc::new(handler)));
        Subscription(id)
    }

    /// Subscribe to all events.
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().expect("bus lock");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.global.push((id, Arc::new(handler)));
        Subscription(id)
    }

    /// Remove a subscription. Removing twice is a no-op.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut inner = self.inner.lock().expect("bus lock");
        inner.typed.retain(|(id, _, _)| *id != subscription.0);
        inner.global.retain(|(id, _)| *id != subscription.0);
    }

    /// Publish an event to all subscribers.
    ///
    /// Type-specific handlers are called first, then global handlers, each
    /// in subscription order. A panicking handler is caught and logged.
    pub fn publish(&self, payload: AgentEvent) {
        let event = Event {
            timestamp: Utc::now(),
            payload,
        };
        let kind = event.payload.kind();

        // Snapshot the handlers so subscribe/unsubscribe from inside a
        // handler can't deadlock or observe a half-mutated list.
        let handlers: Vec<Handler> = {
            let inner = self.inner.lock().expect("bus lock");
            inner
                .typed
                .iter()
                .filter(|(_, k, _)| *k == kind)
                .map(|(_, _, h)| h.clone())
                .chain(inner.global.iter().map(|(_, h)| h.clone()))
                .collect()
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                warn!(event = ?kind, "Event handler panicked");
            }
        }
    }

    /// Remove all subscriptions.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("bus lock");
        inner.typed.clear();
        inner.global.clear();
    }

    /// Number of active subscriptions (typed + global).
    pub fn subscriber_count(&self) -> usize {
        let inner = self.inner.lock().expect("bus lock");
        inner.typed.len() + inner.global.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
