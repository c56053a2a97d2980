//! Event-based progress logger.
//!
//! Subscribes to the event bus and prints dim progress lines to stderr so
//! the conversation output on stdout stays clean. Verbose mode additionally
//! logs every event kind.

use std::sync::Arc;

use super::{AgentEvent, EventBus, EventKind, Subscription};

/// Logs key agent events to stderr for the interactive CLI.
pub struct EventLogger {
    verbose: bool,
    subscriptions: Vec<Subscription>,
}

impl EventLogger {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            subscriptions: Vec::new(),
        }
    }

    /// Attach to an event bus and start logging.
    pub fn attach(&mut self, bus: &Arc<EventBus>) {
        let kinds = [
            EventKind::LoopStarted,
            EventKind::LoopCompleted,
            EventKind::TurnStarted,
            EventKind::TurnCompleted,
            EventKind::LlmResponse,
            EventKind::ToolExecutionStarted,
            EventKind::ToolExecutionCompleted,
            EventKind::ContextCompaction,
        ];
        for kind in kinds {
            self.subscriptions
                .push(bus.subscribe(kind, |event| log_event(&event.payload)));
        }
        if self.verbose {
            self.subscriptions
                .push(bus.subscribe(EventKind::StateChanged, |event| {
                    if let AgentEvent::StateChanged {
                        old_state,
                        new_state,
                    } = &event.payload
                    {
                        eprintln!("  [state] {} -> {}", old_state, new_state);
                    }
                }));
        }
    }

    /// Detach from the bus and stop logging.
    pub fn detach(&mut self, bus: &EventBus) {
        for sub in self.subscriptions.drain(..) {
            bus.unsubscribe(sub);
        }
    }

    /// Number of active subscriptions (for tests).
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

fn log_event(event: &AgentEvent) {
    match event {
        AgentEvent::LoopStarted { user_message, .. } => {
            let preview: String = user_message.chars().take(80).collect();
            eprintln!("{}", "=".repeat(60));
            eprintln!("[start] {}", preview);
        }
        AgentEvent::LoopCompleted {
            termination_reason,
            total_turns,
            duration_ms,
        } => {
            eprintln!(
                "[done] {} | {} turn(s) | {:.0}ms",
                termination_reason, total_turns, duration_ms
            );
            eprintln!("{}", "=".repeat(60));
        }
        AgentEvent::TurnStarted { turn, max_turns } => {
            eprintln!("[turn {}/{}]", turn, max_turns);
        }
        AgentEvent::TurnCompleted { turn, tool_calls } => {
            if *tool_calls > 0 {
                eprintln!("  turn {} completed: {} tool(s)", turn, tool_calls);
            }
        }
        AgentEvent::LlmResponse {
            input_tokens,
            output_tokens,
            duration_ms,
            ..
        } => {
            eprintln!(
                "  llm: {}->{} tokens ({:.0}ms)",
                input_tokens, output_tokens, duration_ms
            );
        }
        AgentEvent::ToolExecutionStarted { tool_name } => {
            eprintln!("  > {}", tool_name);
        }
        AgentEvent::ToolExecutionCompleted {
            tool_name,
            success,
            duration_ms,
        } => {
            let status = if *success { "ok" } else { "failed" };
            eprintln!("  < {} {} ({:.0}ms)", tool_name, status, duration_ms);
        }
        AgentEvent::ContextCompaction {
            tokens_before,
            tokens_after,
            messages_removed,
        } => {
            eprintln!(
                "  [compact] {}->{} tokens (-{} msgs)",
                tokens_before, tokens_after, messages_removed
            );
        }
        _ => {}
    }
}
