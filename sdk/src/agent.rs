//! Agent trait and invocation context
//!
//! Every content generator (research, blog, LinkedIn, image, ...) implements
//! [`Agent`]. The orchestrator owns retries, deadlines and dependency order;
//! an agent only turns one [`AgentTask`] into one [`ContentArtifact`].

use crate::errors::AgentError;
use crate::types::{AgentKind, AgentTask, ContentArtifact, GroundingFragment, VoiceProfile};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Trait that all content agents must implement
#[async_trait]
pub trait Agent: Send + Sync {
    /// The kind this agent serves
    fn kind(&self) -> &AgentKind;

    /// Produce an artifact for `task`
    ///
    /// Implementations should finish within `ctx.deadline`; the orchestrator
    /// abandons the attempt once it passes.
    async fn invoke(&self, task: &AgentTask, ctx: &TaskContext)
        -> Result<ContentArtifact, AgentError>;
}

/// Read-only context handed to an agent for a single attempt.
///
/// The voice profile is a snapshot taken when the decision started, so a
/// concurrent retrain never changes it under a running task.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub session_id: String,

    /// Active voice profile at decision start, if the session has one
    pub voice: Option<Arc<VoiceProfile>>,

    /// Recent conversation turns, most recent first
    pub history: Vec<String>,

    /// Retrieved long-term memory relevant to the request
    pub grounding: Vec<GroundingFragment>,

    /// Artifacts produced by the tasks this one depends on
    pub upstream: Vec<Arc<ContentArtifact>>,

    /// Time budget for this attempt
    pub deadline: Duration,

    /// 1-based attempt number
    pub attempt: u32,
}

impl TaskContext {
    /// Upstream artifact produced by a given kind, if any
    pub fn upstream_of(&self, kind: &AgentKind) -> Option<&ContentArtifact> {
        self.upstream
            .iter()
            .map(|a| a.as_ref())
            .find(|a| &a.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentType, TaskParams, TaskStatus};

    struct EchoAgent {
        kind: AgentKind,
    }

    #[async_trait]
    impl Agent for EchoAgent {
        fn kind(&self) -> &AgentKind {
            &self.kind
        }

        async fn invoke(
            &self,
            task: &AgentTask,
            _ctx: &TaskContext,
        ) -> Result<ContentArtifact, AgentError> {
            Ok(ContentArtifact {
                id: format!("artifact-{}", task.id),
                task_id: task.id.clone(),
                kind: self.kind.clone(),
                content_type: ContentType::Text,
                payload: task.topic().to_string(),
                quality: 1.0,
                voice_conformance: None,
                created_at: 0,
            })
        }
    }

    #[tokio::test]
    async fn test_agent_invocation() {
        let agent = EchoAgent {
            kind: AgentKind::blog(),
        };
        let mut params = TaskParams::new();
        params.insert("topic".into(), serde_json::json!("rust"));
        let task = AgentTask {
            id: "t1".into(),
            decision_id: "d1".into(),
            kind: AgentKind::blog(),
            params,
            depends_on: vec![],
            status: TaskStatus::Running,
            attempts: 1,
            artifact_id: None,
        };
        let ctx = TaskContext {
            session_id: "s1".into(),
            voice: None,
            history: vec![],
            grounding: vec![],
            upstream: vec![],
            deadline: Duration::from_secs(1),
            attempt: 1,
        };

        let artifact = agent.invoke(&task, &ctx).await.unwrap();
        assert_eq!(artifact.payload, "rust");
        assert!(ctx.upstream_of(&AgentKind::research()).is_none());
    }
}
