//! Claude (Anthropic) LLM provider implementation
//!
//! Implements the `LLMProvider` trait for the Anthropic Messages API:
//! request construction, header handling, error classification, and response
//! block parsing. A single request/response function -- no streaming, no
//! automatic retries.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ForgeError, ProviderError, Result};
use crate::session::part_from_wire;

use super::{LLMProvider, ProviderResponse, TokenUsage, ToolSchema};

/// The Claude API endpoint URL.
const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// The Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Claude/Anthropic LLM provider.
pub struct ClaudeProvider {
    /// API key for authentication
    api_key: String,
    /// Model identifier sent with every request
    model: String,
    /// HTTP client for making requests
    client: Client,
}

impl ClaudeProvider {
    /// Create a new Claude provider.
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Create a provider with a custom HTTP client (testing, proxies).
    pub fn with_client(api_key: &str, model: &str, client: Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        }
    }

    /// The configured model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LLMProvider for ClaudeProvider {
    async fn chat(
        &self,
        messages: Vec<Value>,
        system: &str,
        tools: &[ToolSchema],
        max_tokens: u32,
    ) -> Result<ProviderResponse> {
        let request = ClaudeRequest {
            model: self.model.clone(),
            max_tokens,
            messages,
            system: if system.is_empty() {
                None
            } else {
                Some(system.to_string())
            },
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.to_vec())
            },
        };

        let response = self
            .client
            .post(CLAUDE_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();

            // Prefer the structured error body when it parses
            let body = if let Ok(error_response) =
                serde_json::from_str::<ClaudeErrorResponse>(&error_text)
            {
                format!(
                    "Claude API error: {} - {}",
                    error_response.error.r#type, error_response.error.message
                )
            } else {
                format!("Claude API error: {}", error_text)
            };

            return Err(ForgeError::from(ProviderError::from_status(status, body)));
        }

        let claude_response: ClaudeResponse = response.json().await?;
        Ok(convert_response(claude_response))
    }

    fn name(&self) -> &str {
        "claude"
    }
}

fn convert_response(response: ClaudeResponse) -> ProviderResponse {
    ProviderResponse {
        content: response.content.iter().map(part_from_wire).collect(),
        stop_reason: response.stop_reason.unwrap_or_default(),
        usage: TokenUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        },
    }
}

// ============================================================================
// Request/response wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolSchema>>,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<Value>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: ClaudeUsage,
}

#[derive(Debug, Default, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
    error: ClaudeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorDetail {
    r#type: String,
    message: String,
}
