//! Single-task execution: deadline, retry and backoff around one agent

use crate::config::OrchestratorConfig;
use crate::message_bus::{Event, MessageBus};
use crate::orchestrator::FailureAnnotation;
use sdk::agent::{Agent, TaskContext};
use sdk::errors::AgentError;
use sdk::types::{AgentTask, ContentArtifact, FailureReason, TaskStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Deadline and retry limits applied to every task of a decision
#[derive(Debug, Clone)]
pub struct AttemptPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl AttemptPolicy {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            timeout: config.task_timeout(),
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Delay before attempt `attempt + 1`. A backend-requested delay
    /// lengthens it, up to `backoff_max`.
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max);
        match retry_after {
            Some(requested) => delay.max(requested.min(self.backoff_max)),
            None => delay,
        }
    }
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default())
    }
}

/// Result of running one task to a terminal state
#[derive(Debug)]
pub struct TaskRun {
    pub attempts: u32,
    pub result: Result<ContentArtifact, FailureAnnotation>,
}

enum AttemptFailure {
    Agent(AgentError),
    Deadline,
}

impl AttemptFailure {
    fn reason(&self) -> FailureReason {
        match self {
            AttemptFailure::Deadline => FailureReason::TimedOut,
            AttemptFailure::Agent(AgentError::Transient(_)) => FailureReason::TransientError,
            AttemptFailure::Agent(AgentError::Permanent(_)) => FailureReason::PermanentError,
            AttemptFailure::Agent(AgentError::RateLimited { .. }) => FailureReason::RateLimited,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            AttemptFailure::Deadline => true,
            AttemptFailure::Agent(err) => err.is_retryable(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            AttemptFailure::Agent(AgentError::RateLimited {
                retry_after_ms: Some(ms),
            }) => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }

    fn message(&self, timeout: Duration) -> String {
        match self {
            AttemptFailure::Deadline => format!("attempt exceeded {}ms deadline", timeout.as_millis()),
            AttemptFailure::Agent(err) => err.to_string(),
        }
    }
}

async fn publish_status(bus: Option<&MessageBus>, task: &AgentTask, status: TaskStatus) {
    if let Some(bus) = bus {
        bus.publish(Event::TaskStatusChanged {
            decision_id: task.decision_id.clone(),
            task_id: task.id.clone(),
            status,
        })
        .await;
    }
}

/// Run `task` on `agent` until it succeeds, fails permanently or runs out of
/// attempts. `ctx.attempt` is overwritten per attempt.
///
/// Callers hold the task's concurrency permits for the whole call, so the
/// task only reports `Running` once it may actually execute.
pub async fn run_task(
    agent: Arc<dyn Agent>,
    mut task: AgentTask,
    mut ctx: TaskContext,
    policy: &AttemptPolicy,
    bus: Option<&MessageBus>,
) -> TaskRun {
    ctx.deadline = policy.timeout;
    let mut attempt = 0;

    loop {
        attempt += 1;
        task.attempts = attempt;
        task.status = TaskStatus::Running;
        ctx.attempt = attempt;
        publish_status(bus, &task, task.status).await;

        debug!(task_id = %task.id, kind = %task.kind, attempt, "Dispatching task");
        if let Some(bus) = bus {
            bus.publish(Event::TaskDispatched {
                decision_id: task.decision_id.clone(),
                task_id: task.id.clone(),
                kind: task.kind.clone(),
                attempt,
            })
            .await;
        }

        let failure = match tokio::time::timeout(policy.timeout, agent.invoke(&task, &ctx)).await {
            Ok(Ok(mut artifact)) => {
                artifact.task_id = task.id.clone();
                artifact.kind = task.kind.clone();
                return TaskRun {
                    attempts: attempt,
                    result: Ok(artifact),
                };
            }
            Ok(Err(err)) => AttemptFailure::Agent(err),
            Err(_) => {
                task.status = TaskStatus::TimedOut;
                publish_status(bus, &task, task.status).await;
                AttemptFailure::Deadline
            }
        };

        let reason = failure.reason();
        if !failure.is_retryable() || attempt >= policy.max_attempts {
            let message = failure.message(policy.timeout);
            error!(
                task_id = %task.id,
                kind = %task.kind,
                attempts = attempt,
                %reason,
                "Task failed: {}",
                message
            );
            return TaskRun {
                attempts: attempt,
                result: Err(FailureAnnotation::new(reason, message)),
            };
        }

        let delay = policy.backoff(attempt, failure.retry_after());
        warn!(
            task_id = %task.id,
            attempt,
            %reason,
            delay_ms = delay.as_millis() as u64,
            "Task attempt failed, retrying"
        );
        if let Some(bus) = bus {
            bus.publish(Event::TaskRetrying {
                decision_id: task.decision_id.clone(),
                task_id: task.id.clone(),
                attempt,
                reason,
                delay_ms: delay.as_millis() as u64,
            })
            .await;
        }
        tokio::time::sleep(delay).await;
    }
}
