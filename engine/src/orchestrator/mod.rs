//! Orchestrator
//!
//! Runs a validated [`RoutingDecision`] to completion: dispatches eligible
//! tasks in topological order under per-decision, per-session and global
//! concurrency limits, retries failed attempts, cascades upstream failures and
//! aggregates the surviving artifacts into an [`AggregatedResponse`].

pub mod dag;
pub mod executor;
pub mod types;

pub use dag::TaskGraph;
pub use executor::{AttemptPolicy, TaskRun};
pub use types::{AggregatedResponse, DecisionStatus, FailureAnnotation, TaskReport};

use crate::agents::AgentRegistry;
use crate::config::OrchestratorConfig;
use crate::message_bus::{Event, MessageBus};
use crate::router::RoutingDecision;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use sdk::agent::TaskContext;
use sdk::errors::EngineError;
use sdk::types::{
    AgentTask, ContentArtifact, FailureReason, GroundingFragment, TaskStatus, VoiceProfile,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

/// Per-request inputs gathered before dispatch
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub session_id: String,
    /// Voice snapshot shared by every task of the decision
    pub voice: Option<Arc<VoiceProfile>>,
    pub history: Vec<String>,
    pub grounding: Vec<GroundingFragment>,
    /// Per-session in-flight limit
    pub session_permits: Arc<Semaphore>,
}

/// Mutable bookkeeping for one task while the decision runs
#[derive(Debug, Clone)]
struct TaskSlot {
    status: TaskStatus,
    attempts: u32,
    artifact: Option<Arc<ContentArtifact>>,
    failure: Option<FailureAnnotation>,
}

impl TaskSlot {
    fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            attempts: 0,
            artifact: None,
            failure: None,
        }
    }

    fn fail(&mut self, failure: FailureAnnotation) {
        self.status = TaskStatus::Failed;
        self.failure = Some(failure);
    }
}

pub struct Orchestrator {
    agents: Arc<AgentRegistry>,
    policy: AttemptPolicy,
    max_in_flight: usize,
    global_permits: Arc<Semaphore>,
    bus: Option<Arc<MessageBus>>,
}

impl Orchestrator {
    pub fn new(agents: Arc<AgentRegistry>, config: &OrchestratorConfig) -> Self {
        Self {
            agents,
            policy: AttemptPolicy::from_config(config),
            max_in_flight: config.max_in_flight.max(1),
            global_permits: Arc::new(Semaphore::new(config.global_max_in_flight.max(1))),
            bus: None,
        }
    }

    /// Publish lifecycle events on `bus`
    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn policy(&self) -> &AttemptPolicy {
        &self.policy
    }

    async fn publish(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event).await;
        }
    }

    /// Run every task of `decision` to a terminal state.
    ///
    /// Only a malformed decision is an error; task failures are reported in
    /// the response. Flipping `cancel` to `true` stops dispatch, drops
    /// in-flight attempts and discards every artifact.
    pub async fn run(
        &self,
        decision: &RoutingDecision,
        ctx: DecisionContext,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<AggregatedResponse, EngineError> {
        let graph = TaskGraph::build(decision)?;
        let mut agents = Vec::with_capacity(decision.tasks.len());
        for task in &decision.tasks {
            let agent = self.agents.get(&task.kind).ok_or_else(|| {
                EngineError::InvalidDecision(format!(
                    "no agent registered for kind '{}'",
                    task.kind
                ))
            })?;
            agents.push(agent);
        }

        info!(
            decision_id = %decision.id,
            session_id = %ctx.session_id,
            tasks = decision.tasks.len(),
            "Decision received"
        );
        self.publish(Event::DecisionReceived {
            decision_id: decision.id.clone(),
            session_id: ctx.session_id.clone(),
            tasks: decision.tasks.len(),
        })
        .await;

        let mut slots = vec![TaskSlot::pending(); graph.len()];
        let mut unmet: Vec<usize> = (0..graph.len()).map(|i| graph.deps(i).len()).collect();
        // Ready tasks keyed by topological rank
        let mut ready: BTreeSet<usize> = (0..graph.len())
            .filter(|&i| unmet[i] == 0)
            .map(|i| graph.rank(i))
            .collect();
        let mut in_flight: FuturesUnordered<BoxFuture<'_, (usize, TaskRun)>> =
            FuturesUnordered::new();
        let mut cancel_open = true;
        let mut cancelled = *cancel.borrow();
        let mut phase = DecisionStatus::Dispatched;
        debug!(decision_id = %decision.id, status = %phase, "Decision dispatched");

        while !cancelled {
            while in_flight.len() < self.max_in_flight {
                let Some(rank) = ready.pop_first() else {
                    break;
                };
                // Stays Pending here; the executor reports Running once permits are held
                let index = graph.order()[rank];
                let spec = &decision.tasks[index];
                let task = AgentTask {
                    id: spec.id.clone(),
                    decision_id: decision.id.clone(),
                    kind: spec.kind.clone(),
                    params: spec.params.clone(),
                    depends_on: spec.depends_on.clone(),
                    status: TaskStatus::Pending,
                    attempts: 0,
                    artifact_id: None,
                };
                let task_ctx = TaskContext {
                    session_id: ctx.session_id.clone(),
                    voice: ctx.voice.clone(),
                    history: ctx.history.clone(),
                    grounding: ctx.grounding.clone(),
                    upstream: graph
                        .deps(index)
                        .iter()
                        .filter_map(|&dep| slots[dep].artifact.clone())
                        .collect(),
                    deadline: self.policy.timeout,
                    attempt: 0,
                };
                in_flight.push(
                    self.dispatch(
                        index,
                        Arc::clone(&agents[index]),
                        task,
                        task_ctx,
                        Arc::clone(&ctx.session_permits),
                    )
                    .boxed(),
                );
                if phase == DecisionStatus::Dispatched {
                    phase = DecisionStatus::Running;
                    debug!(decision_id = %decision.id, status = %phase, "Decision running");
                }
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                changed = cancel.changed(), if cancel_open => {
                    match changed {
                        Ok(()) => cancelled = *cancel.borrow(),
                        // Sender gone: nobody can cancel any more
                        Err(_) => cancel_open = false,
                    }
                }
                Some((index, run)) = in_flight.next() => {
                    self.settle(decision, &graph, &mut slots, &mut unmet, &mut ready, index, run)
                        .await;
                }
            }
        }

        // Abandon whatever is still running
        drop(in_flight);

        let status = if cancelled {
            warn!(decision_id = %decision.id, "Decision cancelled");
            for index in graph.order().iter().copied() {
                if !slots[index].status.is_final() {
                    slots[index].fail(FailureAnnotation::new(
                        FailureReason::Cancelled,
                        "request cancelled",
                    ));
                    self.publish_failure(decision, index, &slots[index]).await;
                }
            }
            if slots.iter().any(|s| s.status == TaskStatus::Succeeded) {
                DecisionStatus::PartiallyFailed
            } else {
                DecisionStatus::Failed
            }
        } else {
            debug!(decision_id = %decision.id, status = %DecisionStatus::Joining, "Joining");
            let any_top_level = (0..graph.len())
                .any(|i| graph.is_top_level(i) && slots[i].status == TaskStatus::Succeeded);
            if any_top_level {
                DecisionStatus::Aggregated
            } else {
                DecisionStatus::Failed
            }
        };

        let artifacts = if cancelled {
            Vec::new()
        } else {
            graph
                .order()
                .iter()
                .filter_map(|&i| slots[i].artifact.clone())
                .collect()
        };

        let tasks = decision
            .tasks
            .iter()
            .zip(slots)
            .enumerate()
            .map(|(index, (spec, slot))| TaskReport {
                task_id: spec.id.clone(),
                kind: spec.kind.clone(),
                status: slot.status,
                attempts: slot.attempts,
                depends_on: spec.depends_on.clone(),
                top_level: graph.is_top_level(index),
                artifact_id: slot.artifact.as_ref().map(|a| a.id.clone()),
                failure: slot.failure,
            })
            .collect();

        info!(decision_id = %decision.id, %status, "Decision completed");
        self.publish(Event::DecisionCompleted {
            decision_id: decision.id.clone(),
            session_id: ctx.session_id.clone(),
            status,
        })
        .await;

        Ok(AggregatedResponse {
            decision_id: decision.id.clone(),
            session_id: ctx.session_id,
            status,
            artifacts,
            tasks,
        })
    }

    /// Wait for global and session permits, then run the task
    async fn dispatch(
        &self,
        index: usize,
        agent: Arc<dyn sdk::Agent>,
        task: AgentTask,
        ctx: TaskContext,
        session_permits: Arc<Semaphore>,
    ) -> (usize, TaskRun) {
        let permits = match (
            Arc::clone(&self.global_permits).acquire_owned().await,
            session_permits.acquire_owned().await,
        ) {
            (Ok(global), Ok(session)) => (global, session),
            _ => {
                return (
                    index,
                    TaskRun {
                        attempts: 0,
                        result: Err(FailureAnnotation::new(
                            FailureReason::Cancelled,
                            "concurrency limiter closed",
                        )),
                    },
                )
            }
        };
        let run = executor::run_task(agent, task, ctx, &self.policy, self.bus.as_deref()).await;
        drop(permits);
        (index, run)
    }

    #[allow(clippy::too_many_arguments)]
    async fn settle(
        &self,
        decision: &RoutingDecision,
        graph: &TaskGraph,
        slots: &mut [TaskSlot],
        unmet: &mut [usize],
        ready: &mut BTreeSet<usize>,
        index: usize,
        run: TaskRun,
    ) {
        slots[index].attempts = run.attempts;
        match run.result {
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                slots[index].status = TaskStatus::Succeeded;
                slots[index].artifact = Some(Arc::clone(&artifact));
                self.publish(Event::TaskSucceeded {
                    decision_id: decision.id.clone(),
                    task_id: decision.tasks[index].id.clone(),
                    kind: decision.tasks[index].kind.clone(),
                    attempts: run.attempts,
                })
                .await;

                for &child in graph.dependents(index) {
                    unmet[child] -= 1;
                    if unmet[child] == 0 && slots[child].status == TaskStatus::Pending {
                        ready.insert(graph.rank(child));
                    }
                }
            }
            Err(failure) => {
                slots[index].fail(failure);
                self.publish_failure(decision, index, &slots[index]).await;

                for child in graph.descendants(index) {
                    if slots[child].status.is_final() {
                        continue;
                    }
                    debug!(
                        task_id = %graph.id(child),
                        upstream = %graph.id(index),
                        "Skipping task after upstream failure"
                    );
                    slots[child].fail(FailureAnnotation::new(
                        FailureReason::UpstreamFailure,
                        format!("dependency '{}' failed", graph.id(index)),
                    ));
                    self.publish_failure(decision, child, &slots[child]).await;
                }
            }
        }
    }

    async fn publish_failure(&self, decision: &RoutingDecision, index: usize, slot: &TaskSlot) {
        let reason = slot
            .failure
            .as_ref()
            .map(|f| f.reason)
            .unwrap_or(FailureReason::PermanentError);
        self.publish(Event::TaskFailed {
            decision_id: decision.id.clone(),
            task_id: decision.tasks[index].id.clone(),
            kind: decision.tasks[index].kind.clone(),
            reason,
            attempts: slot.attempts,
        })
        .await;
    }
}
