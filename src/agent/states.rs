//! Agent loop states and per-run execution context.

use std::time::Instant;

use serde_json::{json, Value};

/// Current state of the agent loop.
///
/// The loop advances `Idle → ReceivingInput → CallingLlm →
/// ProcessingResponse → {ExecutingTools → CheckingContext → CallingLlm} |
/// Completed`, with `Error` reachable from any state on an unhandled failure
/// and `Completed` reachable directly from `ProcessingResponse` when the
/// response contains no tool invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting (before a `run()` call)
    Idle,
    /// Receiving user input
    ReceivingInput,
    /// Calling the LLM API
    CallingLlm,
    /// Analyzing the LLM response
    ProcessingResponse,
    /// Executing tools
    ExecutingTools,
    /// Checking context size
    CheckingContext,
    /// Completed successfully
    Completed,
    /// Error occurred
    Error,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopState::Idle => "idle",
            LoopState::ReceivingInput => "receiving_input",
            LoopState::CallingLlm => "calling_llm",
            LoopState::ProcessingResponse => "processing_response",
            LoopState::ExecutingTools => "executing_tools",
            LoopState::CheckingContext => "checking_context",
            LoopState::Completed => "completed",
            LoopState::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Why a run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The LLM responded without tool calls (the only normal exit)
    EndTurn,
    /// The turn budget was exhausted
    MaxTurns,
    /// The LLM stop_reason carried a terminal value
    StopReason,
    /// The user interrupted the run (Ctrl+C)
    UserInterrupt,
    /// Terminated due to an error
    Error,
    /// A tool requested termination
    ToolStop,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TerminationReason::EndTurn => "end_turn",
            TerminationReason::MaxTurns => "max_turns",
            TerminationReason::StopReason => "stop_reason",
            TerminationReason::UserInterrupt => "user_interrupt",
            TerminationReason::Error => "error",
            TerminationReason::ToolStop => "tool_stop",
        };
        write!(f, "{}", name)
    }
}

/// Mutable per-run execution record for the agent loop.
///
/// Created fresh (via [`LoopContext::reset`]) at the start of every `run()`
/// call, owned exclusively by the loop while running, and read by external
/// callers only after `run()` returns.
#[derive(Debug)]
pub struct LoopContext {
    /// Current loop state
    pub state: LoopState,
    /// Why the last run terminated, once it has
    pub termination_reason: Option<TerminationReason>,
    /// 1-based turn counter for the current run
    pub current_turn: usize,
    /// Turn budget for a single run
    pub max_turns: usize,
    /// Message of the last unhandled error, if any
    pub last_error: Option<String>,
    /// Total tool executions across the run
    pub total_tool_calls: usize,
    /// Total LLM calls across the run
    pub total_llm_calls: usize,
    /// When the run started
    pub start_time: Option<Instant>,
    /// When the run ended
    pub end_time: Option<Instant>,
    /// State change history, for debugging
    state_history: Vec<(Instant, LoopState)>,
}

impl LoopContext {
    /// Create a fresh context with the given turn budget.
    pub fn new(max_turns: usize) -> Self {
        Self {
            state: LoopState::Idle,
            termination_reason: None,
            current_turn: 0,
            max_turns,
            last_error: None,
            total_tool_calls: 0,
            total_llm_calls: 0,
            start_time: None,
            end_time: None,
            state_history: Vec::new(),
        }
    }

    /// Whether the loop is mid-run.
    pub fn is_running(&self) -> bool {
        !matches!(
            self.state,
            LoopState::Idle | LoopState::Completed | LoopState::Error
        )
    }

    /// Whether the loop has finished (successfully or not).
    pub fn is_finished(&self) -> bool {
        matches!(self.state, LoopState::Completed | LoopState::Error)
    }

    /// Execution time in milliseconds, if the run has started.
    ///
    /// Uses the current time while the run is still in flight.
    pub fn duration_ms(&self) -> Option<f64> {
        self.start_time.map(|start| {
            let end = self.end_time.unwrap_or_else(Instant::now);
            end.duration_since(start).as_secs_f64() * 1000.0
        })
    }

    /// Record a state change, appending to the history.
    pub fn record_state(&mut self, state: LoopState) {
        self.state_history.push((Instant::now(), state));
        self.state = state;
    }

    /// The recorded state transitions, oldest first.
    pub fn state_history(&self) -> impl Iterator<Item = LoopState> + '_ {
        self.state_history.iter().map(|(_, s)| *s)
    }

    /// Reset to a fresh context, keeping the configured turn budget.
    pub fn reset(&mut self) {
        self.state = LoopState::Idle;
        self.termination_reason = None;
        self.current_turn = 0;
        self.last_error = None;
        self.total_tool_calls = 0;
        self.total_llm_calls = 0;
        self.start_time = None;
        self.end_time = None;
        self.state_history.clear();
    }

    /// Serialize the context to a summary dictionary.
    pub fn summary(&self) -> Value {
        json!({
            "state": self.state.to_string(),
            "termination_reason": self.termination_reason.map(|r| r.to_string()),
            "current_turn": self.current_turn,
            "max_turns": self.max_turns,
            "total_tool_calls": self.total_tool_calls,
            "total_llm_calls": self.total_llm_calls,
            "duration_ms": self.duration_ms(),
            "has_error": self.last_error.is_some(),
        })
    }
}
