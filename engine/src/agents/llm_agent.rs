//! Generic agent backed by a text generation provider

use async_trait::async_trait;
use sdk::agent::{Agent, TaskContext};
use sdk::errors::AgentError;
use sdk::types::{AgentKind, AgentTask, ContentArtifact, ContentType};
use std::sync::Arc;
use tracing::debug;

use super::prompt::build_messages;
use crate::llm::{call_with_retry, LLMProvider, RetryPolicy};
use crate::memory::conformance;

pub struct LlmAgent {
    kind: AgentKind,
    content_type: ContentType,
    instructions: String,
    provider: Arc<dyn LLMProvider>,
    retry: RetryPolicy,
}

impl LlmAgent {
    pub fn new(
        kind: AgentKind,
        content_type: ContentType,
        instructions: impl Into<String>,
        provider: Arc<dyn LLMProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            kind,
            content_type,
            instructions: instructions.into(),
            provider,
            retry,
        }
    }
}

/// How close the payload is to the requested length; 1.0 without a target
fn length_quality(task: &AgentTask, payload: &str) -> f32 {
    let Some(target) = task.params.get("target_length").and_then(|v| v.as_u64()) else {
        return 1.0;
    };
    if target == 0 {
        return 1.0;
    }
    let words = payload.split_whitespace().count() as f32;
    let target = target as f32;
    (1.0 - (words - target).abs() / target).clamp(0.0, 1.0)
}

#[async_trait]
impl Agent for LlmAgent {
    fn kind(&self) -> &AgentKind {
        &self.kind
    }

    async fn invoke(
        &self,
        task: &AgentTask,
        ctx: &TaskContext,
    ) -> Result<ContentArtifact, AgentError> {
        let messages = build_messages(&self.instructions, task, ctx);
        let payload = call_with_retry(&self.retry, self.provider.name(), || {
            self.provider.generate(&messages)
        })
        .await?;

        let payload = payload.trim().to_string();
        if payload.is_empty() {
            return Err(AgentError::Transient(format!(
                "{} returned an empty completion",
                self.provider.name()
            )));
        }

        let voice_conformance = ctx.voice.as_ref().map(|voice| conformance(voice, &payload));
        debug!(
            task_id = %task.id,
            kind = %self.kind,
            chars = payload.len(),
            ?voice_conformance,
            "Agent produced artifact"
        );

        Ok(ContentArtifact {
            id: uuid::Uuid::now_v7().to_string(),
            task_id: task.id.clone(),
            kind: self.kind.clone(),
            content_type: self.content_type,
            quality: length_quality(task, &payload),
            payload,
            voice_conformance,
            created_at: chrono::Utc::now().timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMError, Message, Result as LLMResult};
    use sdk::types::{TaskParams, TaskStatus};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FlakyProvider {
        failures: u32,
        calls: AtomicU32,
        error: LLMError,
    }

    #[async_trait]
    impl LLMProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn is_local(&self) -> bool {
            true
        }

        async fn generate(&self, _messages: &[Message]) -> LLMResult<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok("  one two three four  ".to_string())
            }
        }
    }

    fn task(target: Option<u64>) -> AgentTask {
        let mut params = TaskParams::new();
        params.insert("topic".into(), serde_json::json!("x"));
        if let Some(target) = target {
            params.insert("target_length".into(), serde_json::json!(target));
        }
        AgentTask {
            id: "blog".into(),
            decision_id: "d1".into(),
            kind: AgentKind::blog(),
            params,
            depends_on: vec![],
            status: TaskStatus::Running,
            attempts: 1,
            artifact_id: None,
        }
    }

    fn ctx() -> TaskContext {
        TaskContext {
            session_id: "s1".into(),
            voice: None,
            history: vec![],
            grounding: vec![],
            upstream: vec![],
            deadline: Duration::from_secs(5),
            attempt: 1,
        }
    }

    fn agent(provider: FlakyProvider) -> LlmAgent {
        LlmAgent::new(
            AgentKind::blog(),
            ContentType::BlogPost,
            "Write.",
            Arc::new(provider),
            RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn test_retries_provider_outage_at_call_site() {
        let agent = agent(FlakyProvider {
            failures: 2,
            calls: AtomicU32::new(0),
            error: LLMError::ProviderUnavailable("down".into()),
        });

        let artifact = agent.invoke(&task(Some(8)), &ctx()).await.unwrap();
        assert_eq!(artifact.payload, "one two three four");
        assert_eq!(artifact.quality, 0.5);
        assert!(artifact.voice_conformance.is_none());
    }

    #[tokio::test]
    async fn test_exhausted_outage_is_transient() {
        let agent = agent(FlakyProvider {
            failures: 10,
            calls: AtomicU32::new(0),
            error: LLMError::ProviderUnavailable("down".into()),
        });

        let err = agent.invoke(&task(None), &ctx()).await.unwrap_err();
        assert!(matches!(err, AgentError::Transient(_)));
    }

    #[tokio::test]
    async fn test_auth_failure_is_permanent() {
        let agent = agent(FlakyProvider {
            failures: 10,
            calls: AtomicU32::new(0),
            error: LLMError::AuthenticationFailed("bad key".into()),
        });

        let err = agent.invoke(&task(None), &ctx()).await.unwrap_err();
        assert!(matches!(err, AgentError::Permanent(_)));
    }
}
