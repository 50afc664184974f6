//! Routing decision: which agents run, with what inputs, in what order

use sdk::types::{AgentKind, TaskParams};
use serde::{Deserialize, Serialize};

/// One task of a decision, before dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Unique within the decision
    pub id: String,
    pub kind: AgentKind,
    pub params: TaskParams,
    /// Ids of tasks that must succeed before this one runs
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, kind: AgentKind, params: TaskParams) -> Self {
        Self {
            id: id.into(),
            kind,
            params,
            depends_on: Vec::new(),
        }
    }

    pub fn depends_on(mut self, task_id: impl Into<String>) -> Self {
        self.depends_on.push(task_id.into());
        self
    }
}

/// Classifier output for one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindScore {
    pub kind: AgentKind,
    pub score: f64,
}

/// Output of the router.
///
/// Tasks are listed in registration order; that order breaks ties between
/// tasks that become eligible at the same time. The dependency edges must form
/// a DAG, which the orchestrator checks before running anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub id: String,
    pub session_id: String,
    pub request: String,
    pub tasks: Vec<TaskSpec>,
    /// Every scored kind, best first
    #[serde(default)]
    pub scores: Vec<KindScore>,
    /// True when the request was classified through earlier turns
    #[serde(default)]
    pub from_context: bool,
    pub created_at: i64,
}

impl RoutingDecision {
    pub fn new(
        session_id: impl Into<String>,
        request: impl Into<String>,
        tasks: Vec<TaskSpec>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            session_id: session_id.into(),
            request: request.into(),
            tasks,
            scores: Vec::new(),
            from_context: false,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Kinds in task order
    pub fn kinds(&self) -> Vec<&AgentKind> {
        self.tasks.iter().map(|t| &t.kind).collect()
    }

    /// Tasks nothing else depends on
    pub fn top_level(&self) -> Vec<&TaskSpec> {
        self.tasks
            .iter()
            .filter(|t| {
                !self
                    .tasks
                    .iter()
                    .any(|other| other.depends_on.contains(&t.id))
            })
            .collect()
    }
}
