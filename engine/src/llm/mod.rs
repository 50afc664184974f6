//! Model Provider Abstraction Layer
//!
//! Agents talk to text generators through [`LLMProvider`]; the router and the
//! memory manager talk to embedding backends through [`EmbeddingProvider`].
//! Both are black boxes that may fail with `ProviderUnavailable`, which is
//! retried at the call site (see [`retry`]) before it reaches the orchestrator
//! as a transient agent failure.

use async_trait::async_trait;
use sdk::errors::AgentError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod embedding;
pub mod ollama;
pub mod openai;
pub mod retry;

pub use embedding::{cosine_similarity, HashingEmbedder};
pub use retry::{call_with_retry, RetryPolicy};

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during provider calls
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl LLMError {
    /// Whether the call site should try again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LLMError::ProviderUnavailable(_) | LLMError::NetworkError(_) | LLMError::Timeout
        )
    }

    /// Map a reqwest failure the way every HTTP provider does
    pub(crate) fn from_reqwest(err: reqwest::Error, base_url: &str) -> Self {
        if err.is_timeout() {
            LLMError::Timeout
        } else if err.is_connect() {
            LLMError::ProviderUnavailable(format!("Cannot connect to {}", base_url))
        } else {
            LLMError::NetworkError(err.to_string())
        }
    }

    /// Map a non-success HTTP status
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => LLMError::AuthenticationFailed(body),
            429 => LLMError::RateLimitExceeded,
            400 | 404 | 422 => LLMError::InvalidRequest(body),
            _ => LLMError::ProviderUnavailable(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<LLMError> for AgentError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::RateLimitExceeded => AgentError::RateLimited {
                retry_after_ms: None,
            },
            e if e.is_transient() => AgentError::Transient(e.to_string()),
            e => AgentError::Permanent(e.to_string()),
        }
    }
}

/// Message in a prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Text generation backend
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama", "openai")
    fn name(&self) -> &str;

    /// Returns true if this is a local provider (e.g., Ollama)
    fn is_local(&self) -> bool;

    /// Generate a completion for the conversation
    async fn generate(&self, messages: &[Message]) -> Result<String>;
}

/// Text embedding backend
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        assert_eq!(Message::user("Hello").role, MessageRole::User);
        assert_eq!(Message::assistant("Hi").role, MessageRole::Assistant);
        assert_eq!(Message::system("Be brief").role, MessageRole::System);
    }

    #[test]
    fn test_message_serialization() {
        let json = serde_json::to_string(&Message::user("test")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"test"}"#);
    }

    #[test]
    fn test_error_to_agent_error_mapping() {
        assert_eq!(
            AgentError::from(LLMError::ProviderUnavailable("down".into())),
            AgentError::Transient("Provider unavailable: down".into())
        );
        assert_eq!(
            AgentError::from(LLMError::RateLimitExceeded),
            AgentError::RateLimited {
                retry_after_ms: None
            }
        );
        assert!(matches!(
            AgentError::from(LLMError::AuthenticationFailed("bad key".into())),
            AgentError::Permanent(_)
        ));
        assert!(matches!(
            AgentError::from(LLMError::Timeout),
            AgentError::Transient(_)
        ));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            LLMError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()),
            LLMError::RateLimitExceeded
        ));
        assert!(LLMError::from_status(reqwest::StatusCode::BAD_GATEWAY, String::new())
            .is_transient());
        assert!(!LLMError::from_status(reqwest::StatusCode::UNAUTHORIZED, String::new())
            .is_transient());
    }
}
