//! Conversation sessions and messages

use sdk::types::{AgentKind, VoiceProfile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    System,
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
            Role::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "agent" => Some(Role::Agent),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

/// One immutable turn fragment in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Artifact this message delivers, if any
    pub artifact_id: Option<String>,
    /// Unix seconds
    pub timestamp: i64,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, None)
    }

    pub fn agent(content: impl Into<String>, artifact_id: Option<String>) -> Self {
        Self::new(Role::Agent, content, artifact_id)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, None)
    }

    fn new(role: Role, content: impl Into<String>, artifact_id: Option<String>) -> Self {
        Self {
            role,
            content: content.into(),
            artifact_id,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    /// Read-only; kept for audit until TTL expiry
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(SessionStatus::Active),
            "closed" => Some(SessionStatus::Closed),
            _ => None,
        }
    }
}

/// Per-kind outcome counts, used by the router's tie-break
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStats {
    pub succeeded: u32,
    pub failed: u32,
}

impl KindStats {
    /// Fraction of succeeded tasks, or `None` without history
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.succeeded + self.failed;
        (total > 0).then(|| self.succeeded as f64 / total as f64)
    }

    pub fn record(&mut self, succeeded: bool) {
        if succeeded {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Point-in-time copy of a session.
///
/// Handed to the router and to callers; changing it has no effect on the
/// session the memory manager owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: String,
    pub status: SessionStatus,
    /// Oldest first
    pub messages: Vec<Message>,
    pub active_voice: Option<Arc<VoiceProfile>>,
    pub voice_versions: Vec<u32>,
    pub kind_stats: BTreeMap<AgentKind, KindStats>,
    pub created_at: i64,
    pub last_active_at: i64,
}

impl ConversationSession {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Success rate of a kind in this session, `None` if it never ran here
    pub fn success_rate(&self, kind: &AgentKind) -> Option<f64> {
        self.kind_stats.get(kind).and_then(KindStats::success_rate)
    }

    /// Content of the last `n` user messages, most recent first
    pub fn recent_user_messages(&self, n: usize) -> Vec<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::User)
            .take(n)
            .map(|m| m.content.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(messages: Vec<Message>) -> ConversationSession {
        ConversationSession {
            id: "s1".into(),
            status: SessionStatus::Active,
            messages,
            active_voice: None,
            voice_versions: vec![],
            kind_stats: BTreeMap::new(),
            created_at: 0,
            last_active_at: 0,
        }
    }

    #[test]
    fn test_recent_user_messages_newest_first() {
        let session = session_with(vec![
            Message::user("first"),
            Message::agent("reply", None),
            Message::user("second"),
            Message::system("summary"),
        ]);

        assert_eq!(session.recent_user_messages(5), vec!["second", "first"]);
        assert_eq!(session.recent_user_messages(1), vec!["second"]);
    }

    #[test]
    fn test_kind_stats_success_rate() {
        let mut stats = KindStats::default();
        assert_eq!(stats.success_rate(), None);
        stats.record(true);
        stats.record(false);
        stats.record(true);
        stats.record(true);
        assert_eq!(stats.success_rate(), Some(0.75));
    }

    #[test]
    fn test_role_strings() {
        for role in [Role::User, Role::Agent, Role::System] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(SessionStatus::parse("closed"), Some(SessionStatus::Closed));
    }
}
