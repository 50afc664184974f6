//! Blitz Engine Library
//!
//! Routes natural-language content requests to agents, runs the resulting
//! workflow and keeps per-session conversation and brand-voice memory.
//! It is used by both the `blitz` binary and integration tests.

/// Built-in content agents and the agent registry
pub mod agents;

/// CLI interface module
pub mod cli;

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// Command handlers module
pub mod handlers;

/// LLM provider abstraction layer
pub mod llm;

/// Conversation sessions, context windows and brand voice
pub mod memory;

/// Message bus for inter-component communication
pub mod message_bus;

/// Workflow execution over routing decisions
pub mod orchestrator;

/// Intent classification and task planning
pub mod router;

/// Secret management module
pub mod secrets;

/// Request lifecycle tying router, orchestrator and memory together
pub mod service;

/// Telemetry and Observability
pub mod telemetry;

/// Vector store for long-term memory
pub mod vector;
