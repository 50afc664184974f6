//! Error types and handling
//!
//! This module provides the error types shared by the Blitz engine and agent
//! implementations. Engine errors implement the `BlitzErrorExt` trait which
//! provides user-friendly hints and indicates whether errors are recoverable.
//!
//! Two families live here:
//!
//! - [`EngineError`]: hard failures surfaced to the caller (malformed requests,
//!   session lifecycle violations, configuration and storage problems).
//! - [`AgentError`]: typed failures reported by an agent invocation. These never
//!   escape the orchestrator as errors; they become per-task failure annotations.

use thiserror::Error;

/// Trait for Blitz error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information.
pub trait BlitzErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// secrets or internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around by the caller.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Routing**: the request could not be classified
/// - **Session**: lifecycle violations (unknown or closed session)
/// - **Workflow**: malformed routing decisions, cancellation
/// - **Voice**: training and rollback failures
/// - **Infrastructure**: configuration, database, providers, IO
///
/// # Examples
///
/// ```
/// use sdk::errors::{BlitzErrorExt, EngineError};
///
/// let error = EngineError::SessionNotFound("0190-abc".to_string());
/// assert!(!error.is_recoverable());
///
/// let error = EngineError::AmbiguousIntent { best_score: 0.2, threshold: 0.4 };
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Routing errors
    #[error("Ambiguous intent: best score {best_score:.2} is below threshold {threshold:.2}")]
    AmbiguousIntent { best_score: f64, threshold: f64 },

    #[error("Unsupported request: {0}")]
    UnsupportedRequest(String),

    // Session errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session is closed: {0}")]
    SessionClosed(String),

    // Workflow errors
    #[error("Invalid routing decision: {0}")]
    InvalidDecision(String),

    #[error("Request cancelled")]
    Cancelled,

    // Voice errors
    #[error("Voice training requires at least one non-empty sample")]
    EmptyVoiceSamples,

    #[error("Voice profile version {version} not found for session {session_id}")]
    VoiceVersionNotFound { session_id: String, version: u32 },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Provider errors
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    #[error("Path canonicalization failed for {0:?}: {1}")]
    PathCanonicalization(std::path::PathBuf, String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlitzErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::AmbiguousIntent { .. } => {
                "Could not tell what to create. Mention the content type, e.g. 'blog post' or 'image'"
            }
            Self::UnsupportedRequest(_) => "That content type is not supported",

            Self::SessionNotFound(_) => "Unknown session. Create one with 'blitz session new'",
            Self::SessionClosed(_) => "This session is closed. Start a new session",

            Self::InvalidDecision(_) => "The workflow could not be planned",
            Self::Cancelled => "The request was cancelled",

            Self::EmptyVoiceSamples => "Provide at least one sample of your brand's writing",
            Self::VoiceVersionNotFound { .. } => "That voice profile version does not exist",

            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Database operation failed. Check the data directory",
            Self::ProviderUnavailable(_) => {
                "Model provider unavailable. Check your API keys and network"
            }
            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",
            Self::PathCanonicalization(_, _) => "Invalid path specified",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Lifecycle violations and malformed input need a different request
            Self::SessionNotFound(_)
            | Self::SessionClosed(_)
            | Self::UnsupportedRequest(_)
            | Self::InvalidDecision(_)
            | Self::Config(_) => false,

            _ => true,
        }
    }
}

/// Failure reported by a single agent invocation
///
/// The variant decides whether the orchestrator retries the attempt.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AgentError {
    /// Temporary condition (network blip, provider hiccup). Retried.
    #[error("Transient error: {0}")]
    Transient(String),

    /// The task can never succeed as specified. Not retried.
    #[error("Permanent error: {0}")]
    Permanent(String),

    /// The backend asked us to slow down. Retried after backoff.
    #[error("Rate limited")]
    RateLimited { retry_after_ms: Option<u64> },
}

impl AgentError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AgentError::Permanent(_))
    }
}
