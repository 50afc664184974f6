//! Content, task and voice types shared between the engine and agents

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a registered agent kind (e.g. "research", "blog")
///
/// Kinds are open: a new content type is added by registering an agent under
/// a new kind, not by extending an enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentKind(String);

impl AgentKind {
    pub const RESEARCH: &'static str = "research";
    pub const BLOG: &'static str = "blog";
    pub const LINKEDIN: &'static str = "linkedin";
    pub const IMAGE: &'static str = "image";

    /// Create a kind from its name (normalized to lowercase)
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    pub fn research() -> Self {
        Self::new(Self::RESEARCH)
    }

    pub fn blog() -> Self {
        Self::new(Self::BLOG)
    }

    pub fn linkedin() -> Self {
        Self::new(Self::LINKEDIN)
    }

    pub fn image() -> Self {
        Self::new(Self::IMAGE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shape of an artifact payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Research summary with sources
    Research,
    /// Long-form article
    BlogPost,
    /// Short professional social post
    LinkedInPost,
    /// Text prompt describing an image to render
    ImagePrompt,
    /// Reference (URL or path) to a rendered image
    Image,
    /// Anything else
    Text,
}

impl ContentType {
    pub fn as_str(&self) -> &str {
        match self {
            ContentType::Research => "research",
            ContentType::BlogPost => "blog_post",
            ContentType::LinkedInPost => "linkedin_post",
            ContentType::ImagePrompt => "image_prompt",
            ContentType::Image => "image",
            ContentType::Text => "text",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "research" => Some(ContentType::Research),
            "blog_post" => Some(ContentType::BlogPost),
            "linkedin_post" => Some(ContentType::LinkedInPost),
            "image_prompt" => Some(ContentType::ImagePrompt),
            "image" => Some(ContentType::Image),
            "text" => Some(ContentType::Text),
            _ => None,
        }
    }
}

/// Free-form task parameters (topic, keywords, target length, image size, ...)
pub type TaskParams = serde_json::Map<String, serde_json::Value>;

/// Lifecycle of a single agent task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// The current attempt overran its deadline; a retry may follow
    TimedOut,
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timed_out",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "succeeded" => Some(TaskStatus::Succeeded),
            "failed" => Some(TaskStatus::Failed),
            "timed_out" => Some(TaskStatus::TimedOut),
            _ => None,
        }
    }

    /// Succeeded and Failed are final; TimedOut may still be retried
    pub fn is_final(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

/// Why a task ended without an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// A dependency failed, so the task was never dispatched
    UpstreamFailure,
    /// Every attempt overran its deadline
    TimedOut,
    /// Retryable failures exhausted the attempt limit
    TransientError,
    /// The agent reported a non-retryable failure
    PermanentError,
    /// The backend kept rate limiting until attempts ran out
    RateLimited,
    /// The request was cancelled before the task finished
    Cancelled,
}

impl FailureReason {
    pub fn as_str(&self) -> &str {
        match self {
            FailureReason::UpstreamFailure => "upstream_failure",
            FailureReason::TimedOut => "timed_out",
            FailureReason::TransientError => "transient_error",
            FailureReason::PermanentError => "permanent_error",
            FailureReason::RateLimited => "rate_limited",
            FailureReason::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "upstream_failure" => Some(FailureReason::UpstreamFailure),
            "timed_out" => Some(FailureReason::TimedOut),
            "transient_error" => Some(FailureReason::TransientError),
            "permanent_error" => Some(FailureReason::PermanentError),
            "rate_limited" => Some(FailureReason::RateLimited),
            "cancelled" => Some(FailureReason::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of dispatched work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,
    pub decision_id: String,
    pub kind: AgentKind,
    pub params: TaskParams,
    /// Ids of tasks in the same decision that must succeed first
    pub depends_on: Vec<String>,
    pub status: TaskStatus,
    pub attempts: u32,
    pub artifact_id: Option<String>,
}

impl AgentTask {
    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// The subject of the request; every routed task carries one
    pub fn topic(&self) -> &str {
        self.param_str("topic").unwrap_or_default()
    }
}

/// Immutable output of a successful task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentArtifact {
    pub id: String,
    pub task_id: String,
    pub kind: AgentKind,
    pub content_type: ContentType,
    pub payload: String,
    /// Agent-reported quality (0.0-1.0)
    pub quality: f32,
    /// How closely the payload follows the active voice profile (0.0-1.0)
    pub voice_conformance: Option<f32>,
    pub created_at: i64,
}

/// Register of a piece of writing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formality {
    Casual,
    Balanced,
    Formal,
}

/// Dominant grammatical person addressed by the writing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    FirstPerson,
    SecondPerson,
    ThirdPerson,
}

/// Emotional temperature of the writing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Neutral,
    Professional,
    Enthusiastic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneDescriptor {
    pub formality: Formality,
    pub perspective: Perspective,
    pub emotion: Emotion,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VocabularyRules {
    /// Distinctive terms that recur across the samples
    pub preferred_terms: Vec<String>,
    /// Terms the brand never uses
    pub avoided_terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattingRules {
    pub avg_sentence_words: f32,
    pub avg_paragraph_sentences: f32,
    pub uses_headings: bool,
    pub uses_bullets: bool,
    pub uses_emoji: bool,
    pub uses_hashtags: bool,
}

/// Style constraints learned from brand samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleDescriptors {
    pub tone: ToneDescriptor,
    pub vocabulary: VocabularyRules,
    pub formatting: FormattingRules,
}

/// One immutable version of a session's brand voice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub id: String,
    pub session_id: String,
    /// 1-based, strictly increasing per session
    pub version: u32,
    pub descriptors: StyleDescriptors,
    pub sample_count: usize,
    pub created_at: i64,
}

/// A retrieved piece of long-term memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingFragment {
    pub record_id: String,
    pub source_text: String,
    pub score: f32,
    pub artifact_id: Option<String>,
}
