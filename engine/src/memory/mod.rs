//! Memory
//!
//! Conversation sessions, token-bounded context assembly and versioned brand
//! voice profiles. [`MemoryManager`] owns every session; everything else gets
//! snapshots.

pub mod context;
pub mod manager;
pub mod session;
pub mod voice;

pub use context::{estimate_tokens, ContextWindow};
pub use manager::MemoryManager;
pub use session::{ConversationSession, KindStats, Message, Role, SessionStatus};
pub use voice::{conformance, derive_descriptors, VoiceGuidelines};
