//! Decision lifecycle and response types

use sdk::types::{AgentKind, ContentArtifact, FailureReason, TaskStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lifecycle of one routing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Received,
    Dispatched,
    Running,
    Joining,
    /// At least one top-level task produced an artifact
    Aggregated,
    /// Cancelled after some tasks had already succeeded
    PartiallyFailed,
    Failed,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            DecisionStatus::Received => "received",
            DecisionStatus::Dispatched => "dispatched",
            DecisionStatus::Running => "running",
            DecisionStatus::Joining => "joining",
            DecisionStatus::Aggregated => "aggregated",
            DecisionStatus::PartiallyFailed => "partially_failed",
            DecisionStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "received" => Some(DecisionStatus::Received),
            "dispatched" => Some(DecisionStatus::Dispatched),
            "running" => Some(DecisionStatus::Running),
            "joining" => Some(DecisionStatus::Joining),
            "aggregated" => Some(DecisionStatus::Aggregated),
            "partially_failed" => Some(DecisionStatus::PartiallyFailed),
            "failed" => Some(DecisionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DecisionStatus::Aggregated | DecisionStatus::PartiallyFailed | DecisionStatus::Failed
        )
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a task ended without an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureAnnotation {
    pub reason: FailureReason,
    pub message: String,
}

impl FailureAnnotation {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Terminal state of one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub kind: AgentKind,
    pub status: TaskStatus,
    pub attempts: u32,
    pub depends_on: Vec<String>,
    pub top_level: bool,
    pub artifact_id: Option<String>,
    pub failure: Option<FailureAnnotation>,
}

/// What the caller gets back for a request: every task's terminal status and
/// the artifacts that were produced. Partial failure is data, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResponse {
    pub decision_id: String,
    pub session_id: String,
    pub status: DecisionStatus,
    pub artifacts: Vec<Arc<ContentArtifact>>,
    pub tasks: Vec<TaskReport>,
}

impl AggregatedResponse {
    pub fn task(&self, task_id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// Reports that carry a failure annotation
    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|t| t.failure.is_some())
    }

    /// One-line outcome used for the session's summary message
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Decision {} {}: {} artifact(s)",
            self.decision_id,
            self.status,
            self.artifacts.len()
        );
        let failures: Vec<String> = self
            .failures()
            .filter_map(|t| {
                t.failure
                    .as_ref()
                    .map(|f| format!("{} {}", t.kind, f.reason))
            })
            .collect();
        if !failures.is_empty() {
            summary.push_str(&format!("; failed: {}", failures.join(", ")));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(DecisionStatus::Aggregated.is_terminal());
        assert!(DecisionStatus::PartiallyFailed.is_terminal());
        assert!(DecisionStatus::Failed.is_terminal());
        assert!(!DecisionStatus::Joining.is_terminal());
        assert_eq!(
            DecisionStatus::parse("partially_failed"),
            Some(DecisionStatus::PartiallyFailed)
        );
    }

    #[test]
    fn test_summary_lists_failures() {
        let response = AggregatedResponse {
            decision_id: "d1".into(),
            session_id: "s1".into(),
            status: DecisionStatus::Aggregated,
            artifacts: vec![],
            tasks: vec![TaskReport {
                task_id: "image".into(),
                kind: AgentKind::image(),
                status: TaskStatus::Failed,
                attempts: 3,
                depends_on: vec![],
                top_level: true,
                artifact_id: None,
                failure: Some(FailureAnnotation::new(FailureReason::TimedOut, "deadline")),
            }],
        };

        assert_eq!(
            response.summary(),
            "Decision d1 aggregated: 0 artifact(s); failed: image timed_out"
        );
        assert_eq!(response.failures().count(), 1);
    }
}
