/// Decision, task and artifact history
///
/// A decision row is written when routing succeeds and completed once the
/// orchestrator reaches a terminal status, so a crash in between leaves the
/// request visible as `received`.
use anyhow::{Context, Result};
use sdk::types::{AgentKind, ContentArtifact, ContentType, FailureReason, TaskParams, TaskStatus};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::db::now_secs;
use crate::orchestrator::{AggregatedResponse, DecisionStatus, FailureAnnotation};
use crate::router::RoutingDecision;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionSummary {
    pub id: String,
    pub session_id: String,
    pub request: String,
    pub status: DecisionStatus,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub task_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredTask {
    pub id: String,
    pub kind: AgentKind,
    pub params: TaskParams,
    pub depends_on: Vec<String>,
    pub status: TaskStatus,
    pub attempts: u32,
    pub failure: Option<FailureAnnotation>,
    pub artifact_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionDetail {
    pub summary: DecisionSummary,
    /// In decision order
    pub tasks: Vec<StoredTask>,
    pub artifacts: Vec<ContentArtifact>,
}

#[derive(Clone)]
pub struct DecisionRepository {
    pool: SqlitePool,
}

const SUMMARY_COLUMNS: &str = "d.id, d.session_id, d.request, d.status, d.created_at, d.completed_at, \
     (SELECT COUNT(*) FROM agent_tasks t WHERE t.decision_id = d.id) AS task_count";

fn summary_from_row(row: &SqliteRow) -> DecisionSummary {
    DecisionSummary {
        id: row.get("id"),
        session_id: row.get("session_id"),
        request: row.get("request"),
        status: DecisionStatus::parse(&row.get::<String, _>("status"))
            .unwrap_or(DecisionStatus::Failed),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
        task_count: row.get::<i64, _>("task_count") as u32,
    }
}

impl DecisionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a routed decision and its pending tasks
    pub async fn insert_received(&self, decision: &RoutingDecision) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            "INSERT INTO decisions (id, session_id, request, status, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&decision.id)
        .bind(&decision.session_id)
        .bind(&decision.request)
        .bind(DecisionStatus::Received.as_str())
        .bind(decision.created_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert decision")?;

        for (position, task) in decision.tasks.iter().enumerate() {
            sqlx::query(
                "INSERT INTO agent_tasks (id, decision_id, position, kind, params, depends_on, status, attempts) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, 0)",
            )
            .bind(&task.id)
            .bind(&decision.id)
            .bind(position as i64)
            .bind(task.kind.as_str())
            .bind(serde_json::to_string(&task.params)?)
            .bind(serde_json::to_string(&task.depends_on)?)
            .bind(TaskStatus::Pending.as_str())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert task {}", task.id))?;
        }

        tx.commit().await.context("Failed to commit decision")?;
        Ok(())
    }

    /// Store terminal task states and the produced artifacts
    pub async fn complete(&self, response: &AggregatedResponse) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("UPDATE decisions SET status = ?, completed_at = ? WHERE id = ?")
            .bind(response.status.as_str())
            .bind(now_secs())
            .bind(&response.decision_id)
            .execute(&mut *tx)
            .await
            .context("Failed to update decision status")?;

        for report in &response.tasks {
            sqlx::query(
                "UPDATE agent_tasks SET status = ?, attempts = ?, failure_reason = ?, \
                 failure_message = ?, artifact_id = ? WHERE decision_id = ? AND id = ?",
            )
            .bind(report.status.as_str())
            .bind(report.attempts as i64)
            .bind(report.failure.as_ref().map(|f| f.reason.as_str().to_string()))
            .bind(report.failure.as_ref().map(|f| f.message.clone()))
            .bind(&report.artifact_id)
            .bind(&response.decision_id)
            .bind(&report.task_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to update task {}", report.task_id))?;
        }

        for artifact in &response.artifacts {
            sqlx::query(
                "INSERT OR IGNORE INTO artifacts \
                 (id, decision_id, task_id, kind, content_type, payload, quality, voice_conformance, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&artifact.id)
            .bind(&response.decision_id)
            .bind(&artifact.task_id)
            .bind(artifact.kind.as_str())
            .bind(artifact.content_type.as_str())
            .bind(&artifact.payload)
            .bind(artifact.quality as f64)
            .bind(artifact.voice_conformance.map(|v| v as f64))
            .bind(artifact.created_at)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert artifact {}", artifact.id))?;
        }

        tx.commit().await.context("Failed to commit decision outcome")?;
        Ok(())
    }

    /// Most recent decisions first, optionally for one session
    pub async fn history(&self, session_id: Option<&str>, limit: u32) -> Result<Vec<DecisionSummary>> {
        let rows = match session_id {
            Some(session_id) => {
                sqlx::query(&format!(
                    "SELECT {SUMMARY_COLUMNS} FROM decisions d WHERE d.session_id = ? \
                     ORDER BY d.created_at DESC, d.id DESC LIMIT ?"
                ))
                .bind(session_id)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {SUMMARY_COLUMNS} FROM decisions d \
                     ORDER BY d.created_at DESC, d.id DESC LIMIT ?"
                ))
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to fetch decision history")?;

        Ok(rows.iter().map(summary_from_row).collect())
    }

    pub async fn get(&self, decision_id: &str) -> Result<Option<DecisionDetail>> {
        let Some(row) = sqlx::query(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM decisions d WHERE d.id = ?"
        ))
        .bind(decision_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch decision")?
        else {
            return Ok(None);
        };
        let summary = summary_from_row(&row);

        let task_rows = sqlx::query(
            "SELECT id, kind, params, depends_on, status, attempts, failure_reason, failure_message, artifact_id \
             FROM agent_tasks WHERE decision_id = ? ORDER BY position ASC",
        )
        .bind(decision_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch decision tasks")?;

        let mut tasks = Vec::with_capacity(task_rows.len());
        for r in task_rows {
            let failure = r
                .get::<Option<String>, _>("failure_reason")
                .and_then(|reason| FailureReason::parse(&reason))
                .map(|reason| {
                    FailureAnnotation::new(
                        reason,
                        r.get::<Option<String>, _>("failure_message").unwrap_or_default(),
                    )
                });
            tasks.push(StoredTask {
                id: r.get("id"),
                kind: AgentKind::new(r.get::<String, _>("kind")),
                params: serde_json::from_str(&r.get::<String, _>("params"))
                    .context("Corrupt task params")?,
                depends_on: serde_json::from_str(&r.get::<String, _>("depends_on"))
                    .context("Corrupt task dependencies")?,
                status: TaskStatus::parse(&r.get::<String, _>("status")).unwrap_or(TaskStatus::Failed),
                attempts: r.get::<i64, _>("attempts") as u32,
                failure,
                artifact_id: r.get("artifact_id"),
            });
        }

        let artifacts = sqlx::query(
            "SELECT id, task_id, kind, content_type, payload, quality, voice_conformance, created_at \
             FROM artifacts WHERE decision_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(decision_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch artifacts")?
        .into_iter()
        .map(|r| ContentArtifact {
            id: r.get("id"),
            task_id: r.get("task_id"),
            kind: AgentKind::new(r.get::<String, _>("kind")),
            content_type: ContentType::parse(&r.get::<String, _>("content_type"))
                .unwrap_or(ContentType::Text),
            payload: r.get("payload"),
            quality: r.get::<f64, _>("quality") as f32,
            voice_conformance: r.get::<Option<f64>, _>("voice_conformance").map(|v| v as f32),
            created_at: r.get("created_at"),
        })
        .collect();

        Ok(Some(DecisionDetail {
            summary,
            tasks,
            artifacts,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::orchestrator::TaskReport;
    use crate::router::TaskSpec;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn decision() -> RoutingDecision {
        let mut params = TaskParams::new();
        params.insert("topic".into(), serde_json::json!("solar storage"));
        RoutingDecision::new(
            "s1",
            "Write a blog post about solar storage",
            vec![
                TaskSpec::new("research", AgentKind::research(), params.clone()),
                TaskSpec::new("blog", AgentKind::blog(), params).depends_on("research"),
            ],
        )
    }

    #[tokio::test]
    async fn test_received_then_completed() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        db.sessions().create("s1", 1).await.unwrap();
        let repo = db.decisions();
        let decision = decision();

        repo.insert_received(&decision).await.unwrap();
        let pending = repo.get(&decision.id).await.unwrap().unwrap();
        assert_eq!(pending.summary.status, DecisionStatus::Received);
        assert_eq!(pending.tasks[1].depends_on, vec!["research"]);
        assert_eq!(pending.tasks[0].status, TaskStatus::Pending);

        let response = AggregatedResponse {
            decision_id: decision.id.clone(),
            session_id: "s1".into(),
            status: DecisionStatus::Failed,
            artifacts: vec![Arc::new(ContentArtifact {
                id: "a1".into(),
                task_id: "research".into(),
                kind: AgentKind::research(),
                content_type: ContentType::Research,
                payload: "findings".into(),
                quality: 0.8,
                voice_conformance: None,
                created_at: 5,
            })],
            tasks: vec![
                TaskReport {
                    task_id: "research".into(),
                    kind: AgentKind::research(),
                    status: TaskStatus::Succeeded,
                    attempts: 1,
                    depends_on: vec![],
                    top_level: false,
                    artifact_id: Some("a1".into()),
                    failure: None,
                },
                TaskReport {
                    task_id: "blog".into(),
                    kind: AgentKind::blog(),
                    status: TaskStatus::Failed,
                    attempts: 3,
                    depends_on: vec!["research".into()],
                    top_level: true,
                    artifact_id: None,
                    failure: Some(FailureAnnotation::new(FailureReason::TimedOut, "deadline")),
                },
            ],
        };
        repo.complete(&response).await.unwrap();

        let detail = repo.get(&decision.id).await.unwrap().unwrap();
        assert_eq!(detail.summary.status, DecisionStatus::Failed);
        assert!(detail.summary.completed_at.is_some());
        assert_eq!(detail.tasks[1].attempts, 3);
        assert_eq!(
            detail.tasks[1].failure.as_ref().map(|f| f.reason),
            Some(FailureReason::TimedOut)
        );
        assert_eq!(detail.artifacts[0].payload, "findings");

        let outcomes = db.sessions().kind_outcomes("s1").await.unwrap();
        assert_eq!(
            outcomes,
            vec![("blog".to_string(), 0, 1), ("research".to_string(), 1, 0)]
        );
    }

    #[tokio::test]
    async fn test_history_is_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        db.sessions().create("s1", 1).await.unwrap();
        let repo = db.decisions();

        let first = decision();
        let second = decision();
        repo.insert_received(&first).await.unwrap();
        repo.insert_received(&second).await.unwrap();

        let history = repo.history(Some("s1"), 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[0].task_count, 2);
        assert!(repo.history(Some("other"), 10).await.unwrap().is_empty());
        assert!(repo.get("missing").await.unwrap().is_none());
    }
}
