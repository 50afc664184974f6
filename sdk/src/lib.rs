//! Blitz SDK
//!
//! Shared library providing the agent contract, content types and error
//! taxonomy for Blitz components. This crate is used by the engine and by
//! agent implementations.

/// Agent trait and invocation context
pub mod agent;

/// Error types and handling
pub mod errors;

/// Content, task and voice types
pub mod types;

// Re-export commonly used types
pub use agent::{Agent, TaskContext};
pub use errors::{AgentError, BlitzErrorExt, EngineError};
pub use types::{
    AgentKind, AgentTask, ContentArtifact, ContentType, Emotion, FailureReason, Formality,
    FormattingRules, GroundingFragment, Perspective, StyleDescriptors, TaskParams, TaskStatus,
    ToneDescriptor, VocabularyRules, VoiceProfile,
};
