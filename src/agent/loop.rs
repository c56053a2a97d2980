//! Agent loop implementation
//!
//! The turn loop state machine that ties the whole agent together: receive
//! input, call the LLM, scan the response for tool invocations, execute them
//! sequentially, append the results, check context size, and repeat until
//! the model stops calling tools or the turn budget runs out.
//!
//! Failure semantics: an interrupt terminates the run with a fixed message;
//! provider errors (rate limit, API) propagate to the caller un-retried;
//! tool-level failures are contained by the executor and never reach here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info};

use crate::bus::{AgentEvent, EventBus};
use crate::config::Config;
use crate::error::Result;
use crate::provider::{LLMProvider, ProviderResponse};
use crate::session::{MessagePart, Session};
use crate::tools::ToolExecutor;

use super::context::ContextManager;
use super::states::{LoopContext, LoopState, TerminationReason};

/// Fixed response when the turn budget is exhausted. A policy outcome, not
/// an error.
const MAX_TURNS_MESSAGE: &str = "Max turns reached. Please continue with a new message.";

/// Fixed response when the user interrupts a run.
const INTERRUPT_MESSAGE: &str = "Interrupted by user.";

/// Default system prompt for the coding agent.
const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a coding agent that takes action using tools.

IMPORTANT: You MUST use tools to complete tasks. Do NOT just explain how to do something - actually DO it using your tools.

Available tools:
- read: Read file contents
- write: Write/create files
- edit: Edit files by replacing text
- glob: Find files by pattern (e.g., "**/*.rs")
- grep: Search file contents with regex
- bash: Execute shell commands
- todo_write: Plan and track multi-step tasks

RULES:
1. When asked to find/search something, use the glob or grep tool immediately
2. When asked to read/show a file, use the read tool immediately
3. When asked to create/modify a file, use write or edit immediately
4. When asked to run a command, use the bash tool immediately
5. Never explain methods or options - just take action
6. After using tools, summarize what you found/did

Always read files before editing them.
Be careful with destructive bash commands."#;

/// The main agent loop.
///
/// Owns the [`Session`] and [`LoopContext`], holds the tool executor (which
/// owns the permission engine) and the context manager, and publishes
/// lifecycle events on the bus. One `run()` call blocks its caller
/// end-to-end; the whole model is single-writer.
pub struct AgentLoop {
    session: Session,
    context: LoopContext,
    context_manager: ContextManager,
    executor: ToolExecutor,
    provider: Arc<dyn LLMProvider>,
    bus: Arc<EventBus>,
    system_prompt: String,
    max_tokens: u32,
    auto_compaction: bool,
    interrupt: Arc<AtomicBool>,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        executor: ToolExecutor,
        bus: Arc<EventBus>,
        config: &Config,
    ) -> Self {
        Self {
            session: Session::new(),
            context: LoopContext::new(config.max_turns()),
            context_manager: ContextManager::from_config(provider.clone(), config),
            executor,
            provider,
            bus,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: config.max_tokens(),
            auto_compaction: config.enable_auto_compaction(),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the system prompt.
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// The interrupt flag. Setting it true mid-run terminates the run at
    /// the next turn boundary with a `UserInterrupt` reason.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// The conversation session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The per-run execution context (read after `run()` returns).
    pub fn context(&self) -> &LoopContext {
        &self.context
    }

    /// The tool executor.
    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// Reset the conversation: fresh session id, empty history, idle context.
    pub fn reset(&mut self) {
        self.session.clear();
        self.context.reset();
    }

    /// Run the loop with a user message, returning the assistant's final
    /// text response.
    ///
    /// # Errors
    /// Provider failures (rate limit, API errors) propagate after the
    /// context records them -- the loop never retries or swallows them.
    pub async fn run(&mut self, user_message: &str) -> Result<String> {
        self.context.reset();
        self.context.start_time = Some(Instant::now());
        // Consume any stale interrupt from a previous run
        self.interrupt.store(false, Ordering::SeqCst);

        self.bus.publish(AgentEvent::LoopStarted {
            session_id: self.session.id.clone(),
            user_message: user_message.to_string(),
        });

        let result = self.run_inner(user_message).await;

        self.context.end_time = Some(Instant::now());
        match &result {
            Ok(_) => {
                self.set_state(LoopState::Completed);
            }
            Err(e) => {
                self.context.last_error = Some(e.to_string());
                self.context.termination_reason = Some(TerminationReason::Error);
                self.set_state(LoopState::Error);
            }
        }

        self.bus.publish(AgentEvent::LoopCompleted {
            termination_reason: self
                .context
                .termination_reason
                .map(|r| r.to_string())
                .unwrap_or_default(),
            total_turns: self.context.current_turn,
            duration_ms: self.context.duration_ms().unwrap_or(0.0),
        });

        result
    }

    async fn run_inner(&mut self, user_message: &str) -> Result<String> {
        self.set_state(LoopState::ReceivingInput);
        self.session.append_user_text(user_message);
        self.publish_message_added();

        for turn in 0..self.context.max_turns {
            self.context.current_turn = turn + 1;

            if self.interrupt.load(Ordering::SeqCst) {
                info!("Run interrupted by user");
                self.context.termination_reason = Some(TerminationReason::UserInterrupt);
                return Ok(INTERRUPT_MESSAGE.to_string());
            }

            self.bus.publish(AgentEvent::TurnStarted {
                turn: self.context.current_turn,
                max_turns: self.context.max_turns,
            });

            self.set_state(LoopState::CallingLlm);
            let response = self.call_llm().await?;

            self.set_state(LoopState::ProcessingResponse);
            let tool_uses: Vec<(String, String, Value)> = response
                .content
                .iter()
                .filter_map(|part| match part {
                    MessagePart::ToolUse { id, name, input } => {
                        Some((id.clone(), name.clone(), input.clone()))
                    }
                    _ => None,
                })
                .collect();

            if tool_uses.is_empty() {
                // The only normal exit
                debug!("No tool calls in response, ending turn");
                self.context.termination_reason = Some(TerminationReason::EndTurn);
                self.bus.publish(AgentEvent::TurnCompleted {
                    turn: self.context.current_turn,
                    tool_calls: 0,
                });
                return Ok(response.text_content());
            }

            self.session.append_assistant_parts(response.content);
            self.publish_message_added();

            self.set_state(LoopState::ExecutingTools);
            // Sequential and synchronous, in request order: later tool
            // outputs in the same batch may depend on earlier side effects,
            // and the provider expects result order to match invocation
            // order.
            let mut results = Vec::with_capacity(tool_uses.len());
            for (id, name, input) in tool_uses {
                self.bus.publish(AgentEvent::ToolExecutionStarted {
                    tool_name: name.clone(),
                });
                let started = Instant::now();
                let result = self.executor.execute(&name, input).await;
                self.context.total_tool_calls += 1;
                self.bus.publish(AgentEvent::ToolExecutionCompleted {
                    tool_name: name.clone(),
                    success: result.success,
                    duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                });

                let content = if result.success {
                    result.output
                } else {
                    match &result.error {
                        Some(error) => format!("Error: {}\n{}", error, result.output)
                            .trim()
                            .to_string(),
                        None => result.output,
                    }
                };
                results.push((id, content, !result.success));
            }

            let tool_calls = results.len();
            self.session.append_tool_results(results);
            self.publish_message_added();

            self.bus.publish(AgentEvent::TurnCompleted {
                turn: self.context.current_turn,
                tool_calls,
            });

            self.set_state(LoopState::CheckingContext);
            if self.auto_compaction && self.context_manager.should_compact(&self.session) {
                let stats = self.context_manager.compact(&mut self.session).await;
                self.bus.publish(AgentEvent::ContextCompaction {
                    tokens_before: stats.tokens_before,
                    tokens_after: stats.tokens_after,
                    messages_removed: stats
                        .messages_before
                        .saturating_sub(stats.messages_after),
                });
            }
        }

        info!(max_turns = self.context.max_turns, "Turn budget exhausted");
        self.context.termination_reason = Some(TerminationReason::MaxTurns);
        Ok(MAX_TURNS_MESSAGE.to_string())
    }

    async fn call_llm(&mut self) -> Result<ProviderResponse> {
        let messages = self.session.to_wire_format();
        let tools = self.executor.registry().schemas();

        self.bus.publish(AgentEvent::LlmRequest {
            message_count: messages.len(),
            has_tools: !tools.is_empty(),
        });

        let started = Instant::now();
        let response = self
            .provider
            .chat(messages, &self.system_prompt, &tools, self.max_tokens)
            .await?;
        self.context.total_llm_calls += 1;

        self.bus.publish(AgentEvent::LlmResponse {
            stop_reason: response.stop_reason.clone(),
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        });

        Ok(response)
    }

    fn set_state(&mut self, state: LoopState) {
        let old_state = self.context.state;
        self.context.record_state(state);
        self.bus.publish(AgentEvent::StateChanged {
            old_state: old_state.to_string(),
            new_state: state.to_string(),
        });
    }

    fn publish_message_added(&self) {
        if let Some(last) = self.session.messages.last() {
            self.bus.publish(AgentEvent::MessageAdded {
                role: last.role.to_string(),
                part_count: last.parts.len(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ForgeError, ProviderError};
    use crate::provider::{ProviderResponse, TokenUsage, ToolSchema};
    use crate::session::Role;
    use crate::tools::{Tool, ToolRegistry, ToolResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Provider stub that pops scripted responses; the final response
    /// repeats forever.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<ProviderResponse>>,
        last: ProviderResponse,
        fail_with: Option<fn() -> ForgeError>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ProviderResponse>, last: ProviderResponse) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                last,
                fail_with: None,
            }
        }

        fn failing(fail_with: fn() -> ForgeError) -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                last: ProviderResponse::text("unused"),
                fail_with: Some(fail_with),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn chat(
            &self,
            _messages: Vec<Value>,
            _system: &str,
            _tools: &[ToolSchema],
            _max_tokens: u32,
        ) -> Result<ProviderResponse> {
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.last.clone()))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct NullTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for NullTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn parameters(&self) -> Value {
            json!({})
        }
        async fn execute(&self, _args: Value) -> Result<ToolResult> {
            Ok(ToolResult::ok("ok"))
        }
    }

    fn tool_use_response(calls: &[(&str, &str)]) -> ProviderResponse {
        ProviderResponse {
            content: calls
                .iter()
                .map(|(id, name)| MessagePart::tool_use(*id, *name, json!({})))
                .collect(),
            stop_reason: "tool_use".to_string(),
            usage: TokenUsage::default(),
        }
    }

    fn test_loop(provider: ScriptedProvider, max_turns: usize) -> AgentLoop {
        let mut config = Config::defaults();
        config.set("max_turns", json!(max_turns));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(NullTool { name: "noop" }));
        AgentLoop::new(
            Arc::new(provider),
            ToolExecutor::new(registry),
            Arc::new(EventBus::new()),
            &config,
        )
    }

    #[tokio::test]
    async fn test_end_turn_on_text_only_response() {
        let provider = ScriptedProvider::new(vec![], ProviderResponse::text("All done."));
        let mut agent = test_loop(provider, 20);

        let result = agent.run("hello").await.unwrap();

        assert_eq!(result, "All done.");
        assert_eq!(
            agent.context().termination_reason,
            Some(TerminationReason::EndTurn)
        );
        assert_eq!(agent.context().total_llm_calls, 1);
        assert_eq!(agent.context().state, LoopState::Completed);
        // Session holds only the user message: text-only responses return
        // without appending an assistant message
        assert_eq!(agent.session().len(), 1);
    }

    #[tokio::test]
    async fn test_max_turns_with_always_tool_use() {
        let max_turns = 4;
        let provider =
            ScriptedProvider::new(vec![], tool_use_response(&[("id", "noop")]));
        let mut agent = test_loop(provider, max_turns);

        let result = agent.run("go").await.unwrap();

        assert_eq!(result, MAX_TURNS_MESSAGE);
        assert_eq!(
            agent.context().termination_reason,
            Some(TerminationReason::MaxTurns)
        );
        assert_eq!(agent.context().total_llm_calls, max_turns);
        assert_eq!(agent.context().total_tool_calls, max_turns);
        assert_eq!(agent.context().current_turn, max_turns);
    }

    #[tokio::test]
    async fn test_tool_results_appended_as_single_user_message() {
        let provider = ScriptedProvider::new(
            vec![tool_use_response(&[("a", "noop"), ("b", "noop")])],
            ProviderResponse::text("done"),
        );
        let mut agent = test_loop(provider, 20);

        agent.run("go").await.unwrap();

        // user, assistant(tool_use x2), user(tool_result x2)
        assert_eq!(agent.session().len(), 3);
        let results_msg = &agent.session().messages[2];
        assert_eq!(results_msg.role, Role::User);
        assert_eq!(results_msg.parts.len(), 2);
        assert!(results_msg.has_tool_result());
    }

    #[tokio::test]
    async fn test_provider_error_propagates_and_records() {
        let provider = ScriptedProvider::failing(|| {
            ForgeError::Provider(ProviderError::RateLimit("too many requests".into()))
        });
        let mut agent = test_loop(provider, 20);

        let err = agent.run("go").await.unwrap_err();

        assert!(matches!(
            err,
            ForgeError::Provider(ProviderError::RateLimit(_))
        ));
        assert_eq!(agent.context().state, LoopState::Error);
        assert_eq!(
            agent.context().termination_reason,
            Some(TerminationReason::Error)
        );
        assert!(agent
            .context()
            .last_error
            .as_ref()
            .unwrap()
            .contains("Rate limit"));
    }

    #[tokio::test]
    async fn test_interrupt_before_first_turn() {
        let provider = ScriptedProvider::new(vec![], ProviderResponse::text("never"));
        let mut agent = test_loop(provider, 20);
        agent.interrupt_flag().store(true, Ordering::SeqCst);

        // run() clears stale interrupts, so set it from inside via the bus:
        // simpler to verify the in-run path by setting after reset. Here we
        // exercise the stale-flag clearing instead.
        let result = agent.run("go").await.unwrap();
        assert_eq!(result, "never");
        assert_eq!(
            agent.context().termination_reason,
            Some(TerminationReason::EndTurn)
        );
    }

    #[tokio::test]
    async fn test_interrupt_mid_run() {
        // Interrupt from a tool execution: the next turn boundary stops.
        struct InterruptTool {
            flag: Arc<AtomicBool>,
        }

        #[async_trait]
        impl Tool for InterruptTool {
            fn name(&self) -> &str {
                "interrupt"
            }
            fn description(&self) -> &str {
                "sets the interrupt flag"
            }
            fn parameters(&self) -> Value {
                json!({})
            }
            async fn execute(&self, _args: Value) -> Result<ToolResult> {
                self.flag.store(true, Ordering::SeqCst);
                Ok(ToolResult::ok("interrupted"))
            }
        }

        let provider =
            ScriptedProvider::new(vec![], tool_use_response(&[("id", "interrupt")]));
        let mut config = Config::defaults();
        config.set("max_turns", json!(20));
        let registry = ToolRegistry::new();
        let mut agent = AgentLoop::new(
            Arc::new(provider),
            ToolExecutor::new(registry),
            Arc::new(EventBus::new()),
            &config,
        );

        // Register the tool with access to the loop's own flag
        let flag = agent.interrupt_flag();
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(InterruptTool { flag }));
        agent.executor = ToolExecutor::new(registry);

        let result = agent.run("go").await.unwrap();

        assert_eq!(result, INTERRUPT_MESSAGE);
        assert_eq!(
            agent.context().termination_reason,
            Some(TerminationReason::UserInterrupt)
        );
        // One turn ran before the interrupt was observed
        assert_eq!(agent.context().total_llm_calls, 1);
    }

    #[tokio::test]
    async fn test_state_history_for_simple_run() {
        let provider = ScriptedProvider::new(vec![], ProviderResponse::text("hi"));
        let mut agent = test_loop(provider, 20);

        agent.run("hello").await.unwrap();

        let history: Vec<_> = agent.context().state_history().collect();
        assert_eq!(
            history,
            vec![
                LoopState::ReceivingInput,
                LoopState::CallingLlm,
                LoopState::ProcessingResponse,
                LoopState::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_reset_clears_session_and_context() {
        let provider = ScriptedProvider::new(vec![], ProviderResponse::text("hi"));
        let mut agent = test_loop(provider, 20);
        agent.run("hello").await.unwrap();

        let old_id = agent.session().id.clone();
        agent.reset();

        assert!(agent.session().is_empty());
        assert_ne!(agent.session().id, old_id);
        assert_eq!(agent.context().state, LoopState::Idle);
        assert_eq!(agent.context().total_llm_calls, 0);
    }

    #[tokio::test]
    async fn test_multi_turn_conversation_accumulates() {
        let provider = ScriptedProvider::new(
            vec![ProviderResponse::text("first answer")],
            ProviderResponse::text("second answer"),
        );
        let mut agent = test_loop(provider, 20);

        let first = agent.run("question one").await.unwrap();
        let second = agent.run("question two").await.unwrap();

        assert_eq!(first, "first answer");
        assert_eq!(second, "second answer");
        // Both user messages stay in the session across runs
        assert_eq!(agent.session().len(), 2);
        // Counters are per-run
        assert_eq!(agent.context().total_llm_calls, 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_result_flows_back() {
        let provider = ScriptedProvider::new(
            vec![tool_use_response(&[("id", "nonexistent")])],
            ProviderResponse::text("recovered"),
        );
        let mut agent = test_loop(provider, 20);

        let result = agent.run("go").await.unwrap();
        assert_eq!(result, "recovered");

        // The failed result was recorded as an error tool_result part
        let results_msg = &agent.session().messages[2];
        match &results_msg.parts[0] {
            MessagePart::ToolResult {
                content, is_error, ..
            } => {
                assert!(is_error);
                assert!(content.contains("Unknown tool"));
            }
            other => panic!("unexpected part {:?}", other),
        }
    }
}
