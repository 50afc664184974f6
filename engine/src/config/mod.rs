//! Configuration management
//!
//! This module handles loading, validation, and management of the Blitz configuration.
//! Configuration is stored in TOML format at ~/.blitz/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory and log level
//! - **llm**: Model/embedding provider settings and call-site retry policy
//! - **router**: Confidence threshold and parallel margin for intent routing
//! - **orchestrator**: Concurrency limits, deadlines and retry/backoff policy
//! - **memory**: Context window budget, grounding timeout and session TTL
//!
//! Every section has defaults, so an empty file is a valid configuration.
//!
//! # Examples
//!
//! ```no_run
//! use blitz_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Max in flight: {}", config.orchestrator.max_in_flight);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Model provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Intent routing thresholds
    #[serde(default)]
    pub router: RouterConfig,

    /// Workflow execution policy
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Conversation memory settings
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Provider used by the built-in agents (ollama, openai)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Embedding backend (hashing, ollama, openai)
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: String,

    /// Attempts per provider call before surfacing ProviderUnavailable
    #[serde(default = "default_provider_max_attempts")]
    pub provider_max_attempts: u32,

    /// Initial delay between provider call attempts (milliseconds)
    #[serde(default = "default_provider_backoff_ms")]
    pub provider_backoff_ms: u64,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// OpenAI provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Chat model name
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Embedding model name
    #[serde(default = "default_ollama_embedding_model")]
    pub embedding_model: String,
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for OpenAI API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Chat model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Embedding model name
    #[serde(default = "default_openai_embedding_model")]
    pub embedding_model: String,
    // Note: API key comes from BLITZ_OPENAI_API_KEY or the OS keychain, not from config
}

/// Intent routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Minimum score a kind needs to be routed to (0.0-1.0)
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Kinds scoring within this margin of the best kind run alongside it (0.0-1.0)
    #[serde(default = "default_parallel_margin")]
    pub parallel_margin: f64,

    /// Weight applied to scores computed from earlier user turns (0.0-1.0)
    #[serde(default = "default_context_weight")]
    pub context_weight: f64,

    /// Number of earlier user turns considered for follow-up requests
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,

    /// Weight of embedding similarity against keyword score (0.0-1.0)
    #[serde(default = "default_embedding_weight")]
    pub embedding_weight: f64,
}

/// Workflow execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum concurrently running tasks of one decision
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Maximum concurrently running tasks across all sessions
    #[serde(default = "default_global_max_in_flight")]
    pub global_max_in_flight: usize,

    /// Maximum concurrently running tasks of one session
    #[serde(default = "default_session_max_in_flight")]
    pub session_max_in_flight: usize,

    /// Deadline for a single agent attempt (seconds)
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Attempts per task, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt (milliseconds); doubles afterwards
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay (milliseconds)
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl OrchestratorConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

/// Memory system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Default token budget for an assembled context window
    #[serde(default = "default_context_max_tokens")]
    pub context_max_tokens: usize,

    /// Longest wait for vector-store grounding before degrading (milliseconds)
    #[serde(default = "default_grounding_timeout_ms")]
    pub grounding_timeout_ms: u64,

    /// Number of fragments requested from the vector store
    #[serde(default = "default_grounding_k")]
    pub grounding_k: usize,

    /// Share of the context budget reserved for grounding fragments (0.0-1.0)
    #[serde(default = "default_grounding_share")]
    pub grounding_share: f64,

    /// Idle time after which a session is destroyed (seconds, 0 disables)
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Dimension of the built-in hashing embedder
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
}

impl MemoryConfig {
    pub fn grounding_timeout(&self) -> Duration {
        Duration::from_millis(self.grounding_timeout_ms)
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.blitz")
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_embedding_backend() -> String {
    "hashing".to_string()
}

fn default_provider_max_attempts() -> u32 {
    3
}

fn default_provider_backoff_ms() -> u64 {
    250
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_ollama_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_min_confidence() -> f64 {
    0.4
}

fn default_parallel_margin() -> f64 {
    0.25
}

fn default_context_weight() -> f64 {
    0.7
}

fn default_context_messages() -> usize {
    2
}

fn default_embedding_weight() -> f64 {
    0.3
}

fn default_max_in_flight() -> usize {
    4
}

fn default_global_max_in_flight() -> usize {
    32
}

fn default_session_max_in_flight() -> usize {
    4
}

fn default_task_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    10_000
}

fn default_context_max_tokens() -> usize {
    4096
}

fn default_grounding_timeout_ms() -> u64 {
    750
}

fn default_grounding_k() -> usize {
    4
}

fn default_grounding_share() -> f64 {
    0.3
}

fn default_session_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_embedding_dimension() -> usize {
    256
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            embedding_backend: default_embedding_backend(),
            provider_max_attempts: default_provider_max_attempts(),
            provider_backoff_ms: default_provider_backoff_ms(),
            ollama: OllamaConfig::default(),
            openai: OpenAIConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
            embedding_model: default_ollama_embedding_model(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            embedding_model: default_openai_embedding_model(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            parallel_margin: default_parallel_margin(),
            context_weight: default_context_weight(),
            context_messages: default_context_messages(),
            embedding_weight: default_embedding_weight(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            global_max_in_flight: default_global_max_in_flight(),
            session_max_in_flight: default_session_max_in_flight(),
            task_timeout_secs: default_task_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            context_max_tokens: default_context_max_tokens(),
            grounding_timeout_ms: default_grounding_timeout_ms(),
            grounding_k: default_grounding_k(),
            grounding_share: default_grounding_share(),
            session_ttl_secs: default_session_ttl_secs(),
            embedding_dimension: default_embedding_dimension(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.blitz/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default();

        // Serialize before path expansion so the file keeps the portable ~ form
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        config.validate_and_process()?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.blitz/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".blitz").join("config.toml"))
    }

    /// Path of the SQLite database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("blitz.db")
    }

    /// Check value ranges without touching the file system
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["ollama", "openai"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        let valid_backends = ["hashing", "ollama", "openai"];
        if !valid_backends.contains(&self.llm.embedding_backend.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid embedding backend '{}'. Must be one of: {}",
                self.llm.embedding_backend,
                valid_backends.join(", ")
            )));
        }

        for (name, value) in [
            ("router.min_confidence", self.router.min_confidence),
            ("router.parallel_margin", self.router.parallel_margin),
            ("router.context_weight", self.router.context_weight),
            ("router.embedding_weight", self.router.embedding_weight),
            ("memory.grounding_share", self.memory.grounding_share),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        let orchestrator = &self.orchestrator;
        if orchestrator.max_in_flight == 0
            || orchestrator.global_max_in_flight == 0
            || orchestrator.session_max_in_flight == 0
        {
            return Err(EngineError::Config(
                "orchestrator in-flight limits must be at least 1".to_string(),
            ));
        }
        if orchestrator.max_attempts == 0 {
            return Err(EngineError::Config(
                "orchestrator.max_attempts must be at least 1".to_string(),
            ));
        }
        if orchestrator.task_timeout_secs == 0 {
            return Err(EngineError::Config(
                "orchestrator.task_timeout_secs must be at least 1".to_string(),
            ));
        }
        if orchestrator.backoff_max_ms < orchestrator.backoff_base_ms {
            return Err(EngineError::Config(
                "orchestrator.backoff_max_ms must not be below backoff_base_ms".to_string(),
            ));
        }

        if self.memory.embedding_dimension == 0 {
            return Err(EngineError::Config(
                "memory.embedding_dimension must be at least 1".to_string(),
            ));
        }
        if self.memory.context_max_tokens == 0 {
            return Err(EngineError::Config(
                "memory.context_max_tokens must be at least 1".to_string(),
            ));
        }
        if self.memory.grounding_timeout_ms == 0 {
            return Err(EngineError::Config(
                "memory.grounding_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.llm.provider_max_attempts == 0 {
            return Err(EngineError::Config(
                "llm.provider_max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate and process configuration
    ///
    /// This method validates value ranges, expands ~ in the data directory and
    /// creates it if it doesn't exist.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        self.validate()?;

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.core.data_dir = canonicalize_or_create(&self.core.data_dir)?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

/// Canonicalize path, creating it if it doesn't exist
fn canonicalize_or_create(path: &Path) -> Result<PathBuf, EngineError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            EngineError::Config(format!("Failed to create directory {:?}: {}", path, e))
        })?;
    }

    path.canonicalize()
        .map_err(|e| EngineError::PathCanonicalization(path.to_path_buf(), e.to_string()))
}
