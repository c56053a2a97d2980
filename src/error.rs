//! Error types for NanoForge
//!
//! This module defines all error types used throughout the agent.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! The guiding rule for the whole crate: anything the model can plausibly
//! recover from conversationally becomes a failed `ToolResult` (see
//! `tools::ToolResult`), while infrastructure failures the caller must handle
//! propagate as a `ForgeError`.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured provider error classification.
///
/// Categorizes LLM provider HTTP errors so callers can tell a rate limit
/// apart from an authentication or server failure without string matching.
/// None of these are retried by the agent loop -- they surface to the caller
/// of `run()`.
#[derive(Debug)]
pub enum ProviderError {
    /// 401 -- Invalid API key or authentication failure
    Auth(String),
    /// 429 -- Rate limit or quota exceeded
    RateLimit(String),
    /// 400 -- Bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// 500/502/503/504 -- Server-side errors
    ServerError(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Classify an HTTP status code into a provider error.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ProviderError::Auth(body),
            429 => ProviderError::RateLimit(body),
            400 | 404 | 422 => ProviderError::InvalidRequest(body),
            500..=599 => ProviderError::ServerError(body),
            _ => ProviderError::Unknown(body),
        }
    }

    /// Returns `true` if this error is a rate-limit response.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ProviderError::RateLimit(_))
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth(_) => Some(401),
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::InvalidRequest(_) => Some(400),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::Unknown(_) => None,
        }
    }
}

impl From<ProviderError> for ForgeError {
    fn from(err: ProviderError) -> Self {
        ForgeError::Provider(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for NanoForge operations.
#[derive(Error, Debug)]
pub enum ForgeError {
    /// Configuration-related errors (invalid config, missing required fields)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structured provider error with classification (rate limit, auth, etc.)
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// Tool execution errors (invalid parameters, execution failures)
    #[error("Tool error: {0}")]
    Tool(String),

    /// A tool was called without one of its required parameters.
    ///
    /// Detected specifically by the executor so it can append tool-specific
    /// remediation guidance before handing the failure back to the model.
    #[error("Tool '{tool}' called without required parameter '{parameter}'")]
    MissingParameter { tool: String, parameter: String },

    /// Session management errors (malformed wire messages, invalid state)
    #[error("Session error: {0}")]
    Session(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized `Result` type for NanoForge operations.
pub type Result<T> = std::result::Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ForgeError::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let forge_err: ForgeError = io_err.into();
        assert!(matches!(forge_err, ForgeError::Io(_)));
    }

    #[test]
    fn test_missing_parameter_display() {
        let err = ForgeError::MissingParameter {
            tool: "write".to_string(),
            parameter: "content".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Tool 'write' called without required parameter 'content'"
        );
    }

    #[test]
    fn test_provider_error_from_status() {
        assert!(matches!(
            ProviderError::from_status(429, "slow down".into()),
            ProviderError::RateLimit(_)
        ));
        assert!(matches!(
            ProviderError::from_status(401, "bad key".into()),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            ProviderError::from_status(400, "bad json".into()),
            ProviderError::InvalidRequest(_)
        ));
        assert!(matches!(
            ProviderError::from_status(503, "overloaded".into()),
            ProviderError::ServerError(_)
        ));
        assert!(matches!(
            ProviderError::from_status(302, "redirect".into()),
            ProviderError::Unknown(_)
        ));
    }

    #[test]
    fn test_provider_error_is_rate_limit() {
        assert!(ProviderError::RateLimit("429".into()).is_rate_limit());
        assert!(!ProviderError::ServerError("500".into()).is_rate_limit());
        assert!(!ProviderError::Auth("401".into()).is_rate_limit());
    }

    #[test]
    fn test_provider_error_status_code() {
        assert_eq!(ProviderError::Auth("x".into()).status_code(), Some(401));
        assert_eq!(
            ProviderError::RateLimit("x".into()).status_code(),
            Some(429)
        );
        assert_eq!(
            ProviderError::InvalidRequest("x".into()).status_code(),
            Some(400)
        );
        assert_eq!(
            ProviderError::ServerError("x".into()).status_code(),
            Some(500)
        );
        assert_eq!(ProviderError::Unknown("x".into()).status_code(), None);
    }

    #[test]
    fn test_provider_error_into_forge_error() {
        let pe = ProviderError::RateLimit("too fast".into());
        let fe: ForgeError = pe.into();
        assert!(matches!(fe, ForgeError::Provider(_)));
        assert!(fe.to_string().contains("Rate limit error"));
    }
}
