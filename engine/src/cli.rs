//! CLI interface for Blitz
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for driving the content engine.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Blitz content engine
///
/// Routes content requests to research, blog, LinkedIn and image agents,
/// keeps conversation and brand-voice context per session, and aggregates
/// the results.
#[derive(Parser, Debug)]
#[command(name = "blitz")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage conversation sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Submit a content request
    Run {
        /// Session to run the request in
        #[arg(short, long)]
        session: String,

        /// The request, e.g. "write a blog post about solar storage"
        request: String,
    },

    /// Manage the brand voice of a session
    Voice {
        #[command(subcommand)]
        action: VoiceAction,
    },

    /// Show decision history
    History {
        /// Only decisions of this session
        #[arg(short, long)]
        session: Option<String>,

        /// Number of decisions to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Re-run the request of a stored decision
    Replay {
        /// Decision ID to replay
        decision_id: String,

        /// Only show the stored decision, do not run it again
        #[arg(long)]
        show: bool,
    },

    /// Delete sessions idle for longer than the configured TTL
    Purge,

    /// Manage provider API keys in the OS keychain
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
}

/// Keychain actions. `BLITZ_<KEY>` environment variables take precedence
/// over stored keys.
#[derive(Subcommand, Debug)]
pub enum SecretAction {
    /// Store a key; reads it from stdin unless --value is given
    Set {
        /// Key name
        #[arg(default_value = "openai_api_key")]
        key: String,

        /// Key value (visible in shell history; prefer stdin)
        #[arg(long)]
        value: Option<String>,
    },

    /// Remove a stored key
    Delete {
        /// Key name
        #[arg(default_value = "openai_api_key")]
        key: String,
    },

    /// Report whether a key resolves, without printing it
    Status {
        /// Key name
        #[arg(default_value = "openai_api_key")]
        key: String,
    },
}

/// Session management actions
#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Create a new session
    New,

    /// List sessions
    List,

    /// Show a session's messages and voice state
    Show {
        /// Session ID
        id: String,
    },

    /// Close a session; it stays readable
    Close {
        /// Session ID
        id: String,
    },
}

/// Brand voice actions
#[derive(Subcommand, Debug)]
pub enum VoiceAction {
    /// Train a new voice version from sample files
    Train {
        /// Session ID
        #[arg(short, long)]
        session: String,

        /// Files containing brand writing samples
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// TOML file with explicit guidelines (formality, avoided_terms, ...)
        #[arg(long, value_name = "PATH")]
        guidelines: Option<PathBuf>,
    },

    /// Make an earlier voice version active again
    Rollback {
        /// Session ID
        #[arg(short, long)]
        session: String,

        /// Version to activate
        version: u32,
    },

    /// Show the active voice profile and all versions
    Show {
        /// Session ID
        #[arg(short, long)]
        session: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["blitz", "--json", "--log", "debug", "session", "new"]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
        assert!(matches!(
            cli.command,
            Command::Session {
                action: SessionAction::New
            }
        ));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["blitz", "run", "--session", "s1", "write a blog post"]);
        if let Command::Run { session, request } = cli.command {
            assert_eq!(session, "s1");
            assert_eq!(request, "write a blog post");
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_voice_train_requires_files() {
        assert!(Cli::try_parse_from(["blitz", "voice", "train", "--session", "s1"]).is_err());

        let cli = Cli::parse_from(["blitz", "voice", "train", "-s", "s1", "a.md", "b.md"]);
        if let Command::Voice {
            action: VoiceAction::Train { files, .. },
        } = cli.command
        {
            assert_eq!(files.len(), 2);
        } else {
            panic!("Expected VoiceAction::Train");
        }
    }

    #[test]
    fn test_secret_commands_default_to_openai_key() {
        let cli = Cli::parse_from(["blitz", "secret", "status"]);
        if let Command::Secret {
            action: SecretAction::Status { key },
        } = cli.command
        {
            assert_eq!(key, "openai_api_key");
        } else {
            panic!("Expected SecretAction::Status");
        }

        let cli = Cli::parse_from(["blitz", "secret", "set", "--value", "sk-abc"]);
        if let Command::Secret {
            action: SecretAction::Set { key, value },
        } = cli.command
        {
            assert_eq!(key, "openai_api_key");
            assert_eq!(value.as_deref(), Some("sk-abc"));
        } else {
            panic!("Expected SecretAction::Set");
        }
    }

    #[test]
    fn test_history_command() {
        let cli = Cli::parse_from(["blitz", "history", "--limit", "20"]);
        if let Command::History { session, limit } = cli.command {
            assert_eq!(limit, 20);
            assert!(session.is_none());
        } else {
            panic!("Expected History command");
        }
    }
}
