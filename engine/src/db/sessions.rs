/// Session and message persistence
///
/// Messages are append-only: there is no update or delete for a single
/// message. Deleting a session cascades to its messages, voice versions and
/// decision history.
use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

use crate::memory::{Message, Role, SessionStatus};

/// Session row as stored
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub id: String,
    pub status: SessionStatus,
    pub active_voice_version: Option<u32>,
    pub created_at: i64,
    pub last_active_at: i64,
}

#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, id: &str, created_at: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (id, status, created_at, last_active_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(SessionStatus::Active.as_str())
        .bind(created_at)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .context("Failed to create session")?;

        Ok(())
    }

    /// Append a message at position `seq` and bump the session's activity time
    pub async fn append_message(&self, session_id: &str, seq: i64, message: &Message) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            "INSERT INTO messages (session_id, seq, role, content, artifact_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(seq)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.artifact_id)
        .bind(message.timestamp)
        .execute(&mut *tx)
        .await
        .context("Failed to append message")?;

        sqlx::query("UPDATE sessions SET last_active_at = ? WHERE id = ?")
            .bind(message.timestamp)
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .context("Failed to update session activity")?;

        tx.commit().await.context("Failed to commit message")?;
        Ok(())
    }

    pub async fn close(&self, session_id: &str, closed_at: i64) -> Result<()> {
        sqlx::query("UPDATE sessions SET status = ?, closed_at = ? WHERE id = ?")
            .bind(SessionStatus::Closed.as_str())
            .bind(closed_at)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("Failed to close session")?;

        Ok(())
    }

    pub async fn set_active_voice(&self, session_id: &str, version: u32) -> Result<()> {
        sqlx::query("UPDATE sessions SET active_voice_version = ? WHERE id = ?")
            .bind(version as i64)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("Failed to set active voice version")?;

        Ok(())
    }

    /// All sessions, oldest first
    pub async fn load_all(&self) -> Result<Vec<StoredSession>> {
        let rows = sqlx::query(
            "SELECT id, status, active_voice_version, created_at, last_active_at \
             FROM sessions ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load sessions")?;

        Ok(rows
            .into_iter()
            .map(|r| StoredSession {
                id: r.get("id"),
                status: SessionStatus::parse(&r.get::<String, _>("status"))
                    .unwrap_or(SessionStatus::Closed),
                active_voice_version: r
                    .get::<Option<i64>, _>("active_voice_version")
                    .map(|v| v as u32),
                created_at: r.get("created_at"),
                last_active_at: r.get("last_active_at"),
            })
            .collect())
    }

    /// Messages of a session in append order
    pub async fn messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT role, content, artifact_id, created_at FROM messages \
             WHERE session_id = ? ORDER BY seq ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch messages")?;

        Ok(rows
            .into_iter()
            .map(|r| Message {
                role: Role::parse(&r.get::<String, _>("role")).unwrap_or(Role::System),
                content: r.get("content"),
                artifact_id: r.get("artifact_id"),
                timestamp: r.get("created_at"),
            })
            .collect())
    }

    /// Terminal task outcomes per agent kind: `(kind, succeeded, failed)`
    ///
    /// Cancelled tasks and tasks skipped after an upstream failure say nothing
    /// about an agent's reliability and are not counted.
    pub async fn kind_outcomes(&self, session_id: &str) -> Result<Vec<(String, u32, u32)>> {
        let rows = sqlx::query(
            "SELECT t.kind AS kind, \
                    SUM(CASE WHEN t.status = 'succeeded' THEN 1 ELSE 0 END) AS succeeded, \
                    SUM(CASE WHEN t.status = 'failed' THEN 1 ELSE 0 END) AS failed \
             FROM agent_tasks t JOIN decisions d ON d.id = t.decision_id \
             WHERE d.session_id = ? \
               AND (t.failure_reason IS NULL \
                    OR t.failure_reason NOT IN ('cancelled', 'upstream_failure')) \
             GROUP BY t.kind ORDER BY t.kind",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to aggregate task outcomes")?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.get("kind"),
                    r.get::<i64, _>("succeeded") as u32,
                    r.get::<i64, _>("failed") as u32,
                )
            })
            .collect())
    }

    pub async fn delete(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete session")?;

        Ok(())
    }
}
