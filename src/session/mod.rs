//! Session and message model for NanoForge
//!
//! This module defines the typed conversation model: message parts (text,
//! tool invocations, tool results), messages, and the session that owns them.
//! Every part converts to the provider wire format (the block structure the
//! LLM API expects) and round-trips through a serde persistence format with a
//! `part_type` discriminator.
//!
//! The model is deliberately lenient on input: a malformed wire block
//! degrades to a [`MessagePart::Text`] wrapping its string rendering instead
//! of failing, because a single bad block must never abort an entire turn.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Messages from the user (including synthetic tool-result messages)
    User,
    /// Messages from the AI assistant
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single content block within a message.
///
/// This is a closed tagged union: the enum itself is the registry of part
/// shapes, and serde's tag dispatch (`part_type`) covers the persistence
/// format. New variants extend the enum without touching existing match arms
/// that use `_` fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "part_type", rename_all = "snake_case")]
pub enum MessagePart {
    /// Plain text content.
    Text { text: String },
    /// A tool invocation requested by the assistant.
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// The result of a tool invocation, paired by `tool_use_id` with a
    /// `ToolUse` in the immediately preceding assistant message.
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl MessagePart {
    /// Create a text part.
    ///
    /// # Example
    /// ```
    /// use nanoforge::session::{part_from_wire, MessagePart};
    ///
    /// let part = MessagePart::text("hello");
    /// assert_eq!(part_from_wire(&part.to_wire()), part);
    /// ```
    pub fn text(text: impl Into<String>) -> Self {
        MessagePart::Text { text: text.into() }
    }

    /// Create a tool invocation part.
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        MessagePart::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// Create a tool result part.
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        MessagePart::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }

    /// The part type discriminator, as used in both the wire and the
    /// persistence formats.
    pub fn part_type(&self) -> &'static str {
        match self {
            MessagePart::Text { .. } => "text",
            MessagePart::ToolUse { .. } => "tool_use",
            MessagePart::ToolResult { .. } => "tool_result",
        }
    }

    /// Convert this part to the provider wire format block.
    ///
    /// The wire format uses a `type` discriminator and omits `is_error`
    /// on tool results unless it is set, matching what the provider emits.
    pub fn to_wire(&self) -> Value {
        match self {
            MessagePart::Text { text } => json!({ "type": "text", "text": text }),
            MessagePart::ToolUse { id, name, input } => json!({
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": input,
            }),
            MessagePart::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let mut block = json!({
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": content,
                });
                if *is_error {
                    block["is_error"] = json!(true);
                }
                block
            }
        }
    }
}

/// Convert a single wire-format block into a [`MessagePart`].
///
/// Unknown or unparseable blocks degrade to a `Text` part wrapping the
/// block's string rendering rather than failing.
pub fn part_from_wire(block: &Value) -> MessagePart {
    match block.get("type").and_then(Value::as_str) {
        Some("text") => MessagePart::text(
            block
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        ),
        Some("tool_use") => {
            let id = block.get("id").and_then(Value::as_str);
            let name = block.get("name").and_then(Value::as_str);
            match (id, name) {
                (Some(id), Some(name)) => MessagePart::tool_use(
                    id,
                    name,
                    block.get("input").cloned().unwrap_or_else(|| json!({})),
                ),
                _ => MessagePart::text(block.to_string()),
            }
        }
        Some("tool_result") => match block.get("tool_use_id").and_then(Value::as_str) {
            Some(tool_use_id) => {
                // Tool result content is normally a string; anything else is
                // flattened to its JSON rendering.
                let content = match block.get("content") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                MessagePart::tool_result(
                    tool_use_id,
                    content,
                    block
                        .get("is_error")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                )
            }
            None => MessagePart::text(block.to_string()),
        },
        _ => MessagePart::text(block.to_string()),
    }
}

/// Convert a wire-format `content` value (string or block list) into parts.
pub fn parts_from_content(content: &Value) -> Vec<MessagePart> {
    match content {
        Value::String(s) => vec![MessagePart::text(s.clone())],
        Value::Array(blocks) => blocks.iter().map(part_from_wire).collect(),
        other => vec![MessagePart::text(other.to_string())],
    }
}

/// A single message in a conversation: a role plus an ordered sequence of
/// parts. Owned exclusively by the [`Session`] that contains it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

impl Message {
    /// Create a message with the given role and parts.
    pub fn new(role: Role, parts: Vec<MessagePart>) -> Self {
        Self { role, parts }
    }

    /// Create a user message containing a single text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![MessagePart::text(text)])
    }

    /// Append a part during incremental construction.
    pub fn push_part(&mut self, part: MessagePart) {
        self.parts.push(part);
    }

    /// Join all text parts with newlines.
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Iterate over the tool invocation parts of this message.
    pub fn tool_uses(&self) -> impl Iterator<Item = &MessagePart> {
        self.parts
            .iter()
            .filter(|p| matches!(p, MessagePart::ToolUse { .. }))
    }

    /// Whether any part of this message is a tool result.
    pub fn has_tool_result(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, MessagePart::ToolResult { .. }))
    }

    /// Convert to the provider wire format: `{role, content: [blocks]}`.
    pub fn to_wire(&self) -> Value {
        json!({
            "role": self.role.to_string(),
            "content": self.parts.iter().map(MessagePart::to_wire).collect::<Vec<_>>(),
        })
    }
}

/// An ordered conversation owned by one agent loop.
///
/// Sessions grow append-only through the turn loop. The only bulk mutation is
/// [`Session::replace_messages`], used by context compaction, and
/// [`Session::clear`], which resets the session to a fresh id with no
/// messages. Historical messages are never edited or individually deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unique identifier for this conversation.
    pub id: String,
    /// Ordered message history.
    pub messages: Vec<Message>,
}

impl Session {
    /// Create a new empty session with a fresh id.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
        }
    }

    /// Number of messages in the session.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the session has no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a user message containing a single text part.
    pub fn append_user_text(&mut self, text: &str) -> &Message {
        self.messages.push(Message::user_text(text));
        self.messages.last().expect("just pushed")
    }

    /// Append an assistant message built from already-typed parts
    /// (the parsed content of an LLM response).
    pub fn append_assistant_parts(&mut self, parts: Vec<MessagePart>) -> &Message {
        self.messages.push(Message::new(Role::Assistant, parts));
        self.messages.last().expect("just pushed")
    }

    /// Append one synthetic user message containing all tool results for a
    /// turn.
    ///
    /// The provider pairs a single assistant message's invocations with a
    /// single following user message's results, so results are never split
    /// across messages. Each entry is `(tool_use_id, content, is_error)`.
    pub fn append_tool_results(&mut self, results: Vec<(String, String, bool)>) -> &Message {
        let parts = results
            .into_iter()
            .map(|(id, content, is_error)| MessagePart::tool_result(id, content, is_error))
            .collect();
        self.messages.push(Message::new(Role::User, parts));
        self.messages.last().expect("just pushed")
    }

    /// Serialize the whole session to the provider wire format.
    ///
    /// This is the exact inverse of [`Session::replace_messages`] and is used
    /// for every outbound provider call.
    pub fn to_wire_format(&self) -> Vec<Value> {
        self.messages.iter().map(Message::to_wire).collect()
    }

    /// Replace the entire message list from wire-format messages.
    ///
    /// Used only by context compaction. The session id is preserved. Unknown
    /// roles and malformed content degrade defensively to user text messages.
    pub fn replace_messages(&mut self, wire_messages: &[Value]) {
        self.messages = wire_messages
            .iter()
            .map(|msg| {
                let role = match msg.get("role").and_then(Value::as_str) {
                    Some("assistant") => Role::Assistant,
                    _ => Role::User,
                };
                let parts = msg
                    .get("content")
                    .map(parts_from_content)
                    .unwrap_or_default();
                Message::new(role, parts)
            })
            .collect();
    }

    /// Clear the session: new id, empty message list.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.id = Uuid::new_v4().to_string();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
