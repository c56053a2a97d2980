//! Context size management and compaction.
//!
//! The context manager estimates the token footprint of a session, decides
//! when compaction is due, and performs it: split the session at a boundary
//! that never separates a tool invocation from its paired result, summarize
//! the older half through one LLM call, and replace the session's message
//! list with `[summary message] + recent tail`.
//!
//! Token estimation is a deliberate approximation -- character count of the
//! wire-serialized session divided by a configurable constant -- chosen for
//! zero external dependency, not calibrated to any tokenizer.

use std::sync::Arc;

use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::provider::LLMProvider;
use crate::session::{Message, MessagePart, Session};

/// Prompt sent to the LLM when summarizing older conversation history.
const SUMMARY_PROMPT: &str = r#"You have been assisting the user but the conversation is getting long.
Create a concise summary that preserves essential information for continuing the work.

Include in your summary:

1. **Task Overview**
   - User's main request and goals
   - Any constraints or requirements

2. **Work Completed**
   - Files read, created, or modified (with exact paths)
   - Commands executed successfully
   - Key findings or outputs

3. **Important Context**
   - Variable names, function names, type names mentioned
   - Technical decisions made and reasons
   - Errors encountered and how they were resolved
   - User preferences or style requirements

4. **Current State**
   - What needs to be done next
   - Any blockers or open questions

Keep the summary concise (under 1000 words) but preserve ALL critical details.
Focus on facts, not process. Include specific names (files, variables, etc.).
Wrap your entire summary in <summary></summary> tags."#;

/// System prompt for the summarization call.
const SUMMARY_SYSTEM: &str = "You are a helpful assistant that creates concise summaries.";

/// Token cap for the summarization response.
const SUMMARY_MAX_TOKENS: u32 = 8 * 1024;

/// Outcome of a compaction pass, for logging and event publication.
#[derive(Debug, Clone, Copy)]
pub struct CompactionStats {
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub messages_before: usize,
    pub messages_after: usize,
}

/// Estimates session size and performs compaction.
pub struct ContextManager {
    provider: Arc<dyn LLMProvider>,
    limit: usize,
    threshold: f64,
    preserve_recent: usize,
    divisor: usize,
}

impl ContextManager {
    /// Build a context manager from configuration.
    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &Config) -> Self {
        Self {
            provider,
            limit: config.context_limit(),
            threshold: config.compact_threshold(),
            preserve_recent: config.preserve_recent_messages(),
            divisor: config.token_estimate_divisor(),
        }
    }

    /// Estimate the token count of a session.
    ///
    /// Character count of the wire-serialized session divided by the
    /// configured divisor. A cheap, deterministic proxy -- never an exact
    /// tokenizer.
    pub fn estimate_tokens(&self, session: &Session) -> usize {
        let serialized = Value::Array(session.to_wire_format()).to_string();
        serialized.chars().count() / self.divisor
    }

    /// Whether compaction is due.
    ///
    /// False while the session is too short to be worth summarizing;
    /// otherwise true once the estimate crosses `limit * threshold`.
    pub fn should_compact(&self, session: &Session) -> bool {
        if session.len() <= self.preserve_recent + 2 {
            return false;
        }
        let tokens = self.estimate_tokens(session);
        tokens as f64 >= self.limit as f64 * self.threshold
    }

    /// Current usage as a fraction of the limit.
    pub fn usage_ratio(&self, session: &Session) -> f64 {
        self.estimate_tokens(session) as f64 / self.limit as f64
    }

    /// Perform compaction on the session in place.
    ///
    /// Always succeeds structurally: if summarization fails, a placeholder
    /// summary stands in and the split still happens.
    pub async fn compact(&self, session: &mut Session) -> CompactionStats {
        let tokens_before = self.estimate_tokens(session);
        let messages_before = session.len();

        let preserve_count = self.safe_split_point(&session.messages);
        let split_at = session.len() - preserve_count;
        let older = &session.messages[..split_at];
        let recent = &session.messages[split_at..];

        debug!(
            older = older.len(),
            recent = recent.len(),
            "Compacting session"
        );

        let summary = self.generate_summary(older).await;

        let summary_message = json!({
            "role": "user",
            "content": format!("[Previous conversation summary]\n\n{}", summary),
        });
        let mut new_messages = vec![summary_message];
        new_messages.extend(recent.iter().map(Message::to_wire));
        session.replace_messages(&new_messages);

        let stats = CompactionStats {
            tokens_before,
            tokens_after: self.estimate_tokens(session),
            messages_before,
            messages_after: session.len(),
        };
        debug!(
            tokens_before = stats.tokens_before,
            tokens_after = stats.tokens_after,
            messages_before = stats.messages_before,
            messages_after = stats.messages_after,
            "Compaction complete"
        );
        stats
    }

    /// Find a preserve count that never separates a tool invocation from
    /// its paired result.
    ///
    /// If the first message that would be preserved contains a tool result,
    /// the matching tool-use-bearing assistant message is pulled into the
    /// preserved tail as well. One step of look-back suffices because
    /// tool-result messages are always immediately preceded by exactly one
    /// tool-use assistant message by construction.
    fn safe_split_point(&self, messages: &[Message]) -> usize {
        let mut preserve_count = self.preserve_recent;

        if messages.len() <= preserve_count {
            return messages.len();
        }

        let first_recent = &messages[messages.len() - preserve_count];
        if first_recent.has_tool_result() {
            preserve_count += 1;
        }

        preserve_count.min(messages.len())
    }

    /// Summarize the given messages through one LLM call, degrading to a
    /// placeholder on any failure.
    async fn generate_summary(&self, messages: &[Message]) -> String {
        let mut cleaned = clean_messages_for_summary(messages);
        cleaned.push(json!({"role": "user", "content": SUMMARY_PROMPT}));

        match self
            .provider
            .chat(cleaned, SUMMARY_SYSTEM, &[], SUMMARY_MAX_TOKENS)
            .await
        {
            Ok(response) => extract_summary(&response.text_content()),
            Err(e) => {
                warn!(error = %e, "Summarization failed, using placeholder summary");
                format!("Previous conversation covered multiple topics. (Error: {})", e)
            }
        }
    }
}

/// Extract the `<summary>`-delimited text, falling back to the whole
/// response when the delimiter is absent.
fn extract_summary(text: &str) -> String {
    let re = Regex::new(r"(?s)<summary>(.*?)</summary>").expect("static regex");
    match re.captures(text) {
        Some(caps) => caps[1].trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Strip structural tool metadata, keeping only human-readable text:
/// text parts verbatim, tool invocations and results as bracketed notes
/// with truncated content.
fn clean_messages_for_summary(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .filter_map(|msg| {
            let mut text_parts = Vec::new();
            for part in &msg.parts {
                match part {
                    MessagePart::Text { text } => text_parts.push(text.clone()),
                    MessagePart::ToolUse { name, input, .. } => {
                        let input_str: String = input.to_string().chars().take(100).collect();
                        text_parts.push(format!("[Used tool: {} with {}...]", name, input_str));
                    }
                    MessagePart::ToolResult { content, .. } => {
                        let content_str: String = content.chars().take(200).collect();
                        text_parts.push(format!("[Tool result: {}...]", content_str));
                    }
                }
            }
            if text_parts.is_empty() {
                None
            } else {
                Some(json!({
                    "role": msg.role.to_string(),
                    "content": text_parts.join("\n"),
                }))
            }
        })
        .collect()
}
